use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FpError;

// ---------------------------------------------------------------------------
// Scan configuration
// ---------------------------------------------------------------------------

/// Parameters of one wavelength sweep.
///
/// Wavelengths are in nanometres, delays in milliseconds. Missing JSON
/// fields fall back to the bench defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub start_nm: f64,
    pub stop_nm: f64,
    pub step_nm: f64,
    /// Wait after each wavelength command before sampling.
    pub settle_delay_ms: u64,
    /// Detector reads per grid point; only the first valid one is kept.
    pub samples_per_point: u32,
    pub inter_sample_delay_ms: u64,
    /// Detector index passed to `PowerDetector::open`.
    pub device_index: i32,
    /// Packet buffer size passed to `PowerDetector::sample`.
    pub max_count: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_nm: 1549.0,
            stop_nm: 1551.0,
            step_nm: 0.05,
            settle_delay_ms: 500,
            samples_per_point: 2,
            inter_sample_delay_ms: 500,
            device_index: 0,
            max_count: 8,
        }
    }
}

impl ScanConfig {
    /// Check the sweep bounds before any instrument is touched.
    pub fn validate(&self) -> Result<(), FpError> {
        let bounds = [self.start_nm, self.stop_nm, self.step_nm];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(FpError::InvalidConfig(
                "wavelength bounds and step must be finite".into(),
            ));
        }
        if self.start_nm >= self.stop_nm {
            return Err(FpError::InvalidConfig(format!(
                "start wavelength {} nm must be less than stop wavelength {} nm",
                self.start_nm, self.stop_nm
            )));
        }
        if self.step_nm <= 0.0 {
            return Err(FpError::InvalidConfig(format!(
                "step must be positive, got {} nm",
                self.step_nm
            )));
        }
        if self.samples_per_point == 0 {
            return Err(FpError::InvalidConfig(
                "samples per point must be at least 1".into(),
            ));
        }
        if self.max_count == 0 {
            return Err(FpError::InvalidConfig(
                "detector packet count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Number of grid points visited by a full sweep.
    pub fn point_count(&self) -> usize {
        // Small slack so that e.g. (1551 - 1549) / 0.05 lands on 40, not 39.999...
        ((self.stop_nm - self.start_nm) / self.step_nm + 1e-9).floor() as usize + 1
    }

    /// The sweep grid `start, start + step, ...` up to and including `stop`.
    pub fn grid(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.point_count()).map(move |i| self.start_nm + i as f64 * self.step_nm)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn inter_sample_delay(&self) -> Duration {
        Duration::from_millis(self.inter_sample_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Analysis configuration
// ---------------------------------------------------------------------------

/// Tunables of the offline fringe analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum separation between two maxima (or two minima), in nm.
    pub peak_distance_nm: f64,
    /// Allowed grid deviation, as a fraction of the sampling step.
    pub grid_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            peak_distance_nm: 0.1,
            grid_tolerance: 1e-6,
        }
    }
}

/// Top-level JSON config file: both sections are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanConfig,
    pub analysis: AnalysisConfig,
}

/// Read a JSON document from `path` into `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_covers_both_ends() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.point_count(), 41);
        let grid: Vec<f64> = cfg.grid().collect();
        assert_eq!(grid[0], 1549.0);
        assert!((grid[40] - 1551.0).abs() < 1e-9);
    }

    #[test]
    fn point_count_floors_partial_steps() {
        let cfg = ScanConfig {
            start_nm: 0.0,
            stop_nm: 1.0,
            step_nm: 0.3,
            ..Default::default()
        };
        assert_eq!(cfg.point_count(), 4);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let cfg = ScanConfig {
            start_nm: 1551.0,
            stop_nm: 1549.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(FpError::InvalidConfig(_))));

        let equal = ScanConfig {
            stop_nm: 1549.0,
            ..Default::default()
        };
        assert!(matches!(equal.validate(), Err(FpError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_non_positive_step() {
        for step in [0.0, -0.1, f64::NAN] {
            let cfg = ScanConfig {
                step_nm: step,
                ..Default::default()
            };
            assert!(matches!(cfg.validate(), Err(FpError::InvalidConfig(_))));
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(&path, r#"{ "scan": { "step_nm": 0.01 } }"#).unwrap();

        let settings: Settings = load_json(&path).unwrap();
        assert_eq!(settings.scan.step_nm, 0.01);
        assert_eq!(settings.scan.start_nm, 1549.0);
        assert_eq!(settings.analysis, AnalysisConfig::default());
    }
}
