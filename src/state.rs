use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::data::loader::save_scan;
use crate::data::model::{Observation, Spectrum};
use crate::error::FpError;
use crate::scan::{ScanEvent, ScanHandle, ScanOutcome, ScanState};

/// Detector readings are recorded in W and persisted in mW.
pub const W_TO_MW: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Scan session state
// ---------------------------------------------------------------------------

/// Everything a front end keeps about the current scan, independent of
/// rendering: the data collected so far, the log trail and the status.
#[derive(Debug, Clone)]
pub struct ScanSession {
    /// Observations in arrival (ascending wavelength) order.
    pub observations: Vec<Observation>,

    /// Human-readable log lines.
    pub log: Vec<String>,

    /// Latest reported controller state.
    pub state: ScanState,

    /// Set once the controller reports `Finished`.
    pub outcome: Option<ScanOutcome>,

    /// Last failure message shown to the user.
    pub status_message: Option<String>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self {
            observations: Vec::new(),
            log: Vec::new(),
            state: ScanState::Idle,
            outcome: None,
            status_message: None,
        }
    }
}

impl ScanSession {
    /// Forget the previous scan before a new one starts.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Fold one controller event into the session.
    pub fn apply(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::State(state) => self.state = state,
            ScanEvent::Log(line) => self.log.push(line),
            ScanEvent::Observation(obs) => self.observations.push(obs),
            ScanEvent::Failed(err) => self.status_message = Some(err.to_string()),
            ScanEvent::Finished(outcome) => self.outcome = Some(outcome),
        }
    }

    /// Apply every event of `handle` until its channel closes, passing each
    /// log line to `on_log` as it arrives.
    pub fn follow(&mut self, handle: &ScanHandle, mut on_log: impl FnMut(&str)) {
        for event in handle.events().iter() {
            if let ScanEvent::Log(line) = &event {
                on_log(line);
            }
            self.apply(event);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// The collected data as a spectrum in mW, ready to be saved.
    pub fn to_spectrum(&self) -> Result<Spectrum, FpError> {
        let (wavelengths, powers) = self
            .observations
            .iter()
            .map(|o| (o.wavelength_nm, o.power * W_TO_MW))
            .unzip();
        Spectrum::new(wavelengths, powers)
    }

    /// Save whatever was collected, partial or not, under `dir`.
    ///
    /// Returns `None` when there are fewer than two points to save.
    pub fn save(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if self.observations.len() < 2 {
            return Ok(None);
        }
        let spectrum = self.to_spectrum()?;
        save_scan(dir, &spectrum).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(wavelength_nm: f64, power: f64) -> ScanEvent {
        ScanEvent::Observation(Observation {
            wavelength_nm,
            power,
        })
    }

    #[test]
    fn keeps_partial_data_after_failure() {
        let mut session = ScanSession::default();
        for event in [
            ScanEvent::State(ScanState::Sweeping),
            obs(1549.0, 1e-3),
            obs(1549.05, 2e-3),
            ScanEvent::Failed(FpError::Acquisition("sample timed out".into())),
            ScanEvent::State(ScanState::Faulted),
            ScanEvent::Finished(ScanOutcome::Faulted(FpError::Acquisition("sample timed out".into()))),
        ] {
            session.apply(event);
        }

        assert!(session.is_finished());
        assert_eq!(session.state, ScanState::Faulted);
        assert_eq!(session.observations.len(), 2);
        assert!(session.status_message.as_deref().unwrap().contains("timed out"));

        let sp = session.to_spectrum().unwrap();
        assert_eq!(sp.powers(), &[1.0, 2.0]);
    }

    #[test]
    fn single_point_cannot_be_saved() {
        let mut session = ScanSession::default();
        session.apply(obs(1549.0, 1e-3));
        assert!(session.to_spectrum().is_err());

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(session.save(dir.path()).unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        session.clear();
        assert!(session.observations.is_empty());
        assert_eq!(session.state, ScanState::Idle);
    }
}
