use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::data::model::Observation;
use crate::error::{FpError, InstrumentError};
use crate::instrument::{DetectorHandle, InstrumentProvider, PowerDetector, TunableSource};

// ---------------------------------------------------------------------------
// States, events, outcome
// ---------------------------------------------------------------------------

/// Lifecycle of one scan.
///
/// `Idle → Initializing → Sweeping → {Completing | Cancelling | Faulted} → Closed`;
/// a bring-up failure goes straight from `Initializing` to `Faulted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Initializing,
    Sweeping,
    Completing,
    Cancelling,
    Faulted,
    Closed,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Initializing => "initializing",
            ScanState::Sweeping => "sweeping",
            ScanState::Completing => "completing",
            ScanState::Cancelling => "cancelling",
            ScanState::Faulted => "faulted",
            ScanState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a scan ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
    Faulted(FpError),
}

/// Everything the worker reports, in the order it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    State(ScanState),
    Log(String),
    Observation(Observation),
    /// Structured failure: bring-up, handshake or sweep error.
    Failed(FpError),
    /// Always the last event of a scan.
    Finished(ScanOutcome),
}

/// Final result of a scan, returned by [`ScanHandle::wait`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// Every observation emitted, including those before a fault.
    pub observations: Vec<Observation>,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative stop flag, checked once per wavelength step.
///
/// Every scan gets a fresh token, so cancelling a finished scan never
/// reaches the next one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Clears the controller's busy flag once teardown is done, or when the
/// worker unwinds.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// ScanController
// ---------------------------------------------------------------------------

/// Runs at most one scan at a time against an instrument pair.
pub struct ScanController<P: InstrumentProvider> {
    provider: Arc<P>,
    busy: Arc<AtomicBool>,
    /// Token of the most recently started scan.
    current: Mutex<CancelToken>,
}

impl<P: InstrumentProvider> ScanController<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            busy: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(CancelToken::new()),
        }
    }

    /// Whether a scan is in progress, up to the end of its teardown.
    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Request the running scan, if any, to stop after its current step.
    pub fn cancel(&self) {
        self.current_token().cancel();
    }

    fn current_token(&self) -> CancelToken {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate `config` and start the sweep on a background worker.
    ///
    /// Fails with [`FpError::InvalidConfig`] before touching any instrument,
    /// or [`FpError::ScanAlreadyRunning`] if the previous scan has not
    /// finished its teardown yet.
    pub fn start(&self, config: ScanConfig) -> Result<ScanHandle, FpError> {
        config.validate()?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FpError::ScanAlreadyRunning);
        }
        let busy = BusyGuard(Arc::clone(&self.busy));
        let cancel = CancelToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

        let (tx, rx) = mpsc::channel();
        let worker = ScanWorker {
            provider: Arc::clone(&self.provider),
            config,
            cancel: cancel.clone(),
            events: tx,
            observations: Vec::new(),
            busy: Some(busy),
        };

        let join = thread::Builder::new()
            .name("fp-scan".into())
            .spawn(move || worker.run())
            .map_err(|e| FpError::DeviceInit(format!("spawning scan worker: {e}")))?;

        Ok(ScanHandle {
            events: rx,
            cancel,
            join,
        })
    }
}

/// Caller's side of a running scan.
pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    cancel: CancelToken,
    join: JoinHandle<ScanReport>,
}

impl ScanHandle {
    /// Events in emission order; the channel closes after `Finished`.
    ///
    /// By the time `Finished` arrives the controller accepts a new start.
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// This scan's stop flag, e.g. for a signal handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block until teardown is done and return the report.
    pub fn wait(self) -> ScanReport {
        match self.join.join() {
            Ok(report) => report,
            Err(_) => {
                error!("scan worker panicked");
                ScanReport {
                    outcome: ScanOutcome::Faulted(FpError::Acquisition("scan worker panicked".into())),
                    observations: Vec::new(),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Whatever was acquired during bring-up, so teardown can undo exactly that.
struct Instruments<S, D> {
    source: Option<S>,
    output_enabled: bool,
    detector: Option<D>,
    detector_initialized: bool,
    handle: Option<DetectorHandle>,
}

impl<S, D> Default for Instruments<S, D> {
    fn default() -> Self {
        Self {
            source: None,
            output_enabled: false,
            detector: None,
            detector_initialized: false,
            handle: None,
        }
    }
}

struct ScanWorker<P: InstrumentProvider> {
    provider: Arc<P>,
    config: ScanConfig,
    cancel: CancelToken,
    events: Sender<ScanEvent>,
    observations: Vec<Observation>,
    busy: Option<BusyGuard>,
}

impl<P: InstrumentProvider> ScanWorker<P> {
    fn run(mut self) -> ScanReport {
        self.set_state(ScanState::Initializing);
        let mut inst = Instruments::default();

        let outcome = match self.bring_up(&mut inst) {
            Err(e) => ScanOutcome::Faulted(e),
            Ok(()) => {
                self.set_state(ScanState::Sweeping);
                match self.sweep(&mut inst) {
                    Ok(outcome) => outcome,
                    Err(e) => ScanOutcome::Faulted(e),
                }
            }
        };

        match &outcome {
            ScanOutcome::Completed => {
                self.set_state(ScanState::Completing);
                self.log("Scan finished.".into());
            }
            ScanOutcome::Cancelled => {
                self.set_state(ScanState::Cancelling);
                self.log("Scan stopped.".into());
            }
            ScanOutcome::Faulted(e) => {
                self.set_state(ScanState::Faulted);
                error!("Error during scan: {e}");
                self.emit(ScanEvent::Log(format!("Error during scan: {e}")));
                self.emit(ScanEvent::Failed(e.clone()));
            }
        }

        self.teardown(&mut inst);
        self.set_state(ScanState::Closed);
        drop(self.busy.take());
        self.emit(ScanEvent::Finished(outcome.clone()));

        ScanReport {
            outcome,
            observations: self.observations,
        }
    }

    fn bring_up(&mut self, inst: &mut Instruments<P::Source, P::Detector>) -> Result<(), FpError> {
        let init = |e: InstrumentError| FpError::DeviceInit(e.to_string());

        self.log("Init laser...".into());
        inst.source = Some(self.provider.connect_source().map_err(init)?);

        self.log("Init powermeter...".into());
        let detector = inst.detector.insert(self.provider.load_detector().map_err(init)?);
        detector.initialize().map_err(init)?;
        inst.detector_initialized = true;

        let handle = detector.open(self.config.device_index).map_err(init)?;
        inst.handle = Some(handle);
        self.log(format!("Device opened with handle: {handle}"));

        detector
            .synchronize(handle)
            .map_err(|e| FpError::DeviceHandshake(e.to_string()))?;
        self.log("Communication synchronized.".into());

        if let Some(source) = inst.source.as_mut() {
            source.enable_output().map_err(init)?;
            inst.output_enabled = true;
        }
        Ok(())
    }

    fn sweep(&mut self, inst: &mut Instruments<P::Source, P::Detector>) -> Result<ScanOutcome, FpError> {
        let (Some(source), Some(detector), Some(handle)) =
            (inst.source.as_mut(), inst.detector.as_mut(), inst.handle)
        else {
            return Err(FpError::DeviceInit("instruments not ready".into()));
        };
        let acq = |e: InstrumentError| FpError::Acquisition(e.to_string());

        let total = self.config.point_count();
        info!(
            "sweeping {} → {} nm in {} points",
            self.config.start_nm, self.config.stop_nm, total
        );

        for i in 0..total {
            if self.cancel.is_cancelled() {
                info!("cancellation observed after {i} of {total} points");
                return Ok(ScanOutcome::Cancelled);
            }

            let wl = self.config.start_nm + i as f64 * self.config.step_nm;
            source.set_wavelength(wl).map_err(acq)?;
            thread::sleep(self.config.settle_delay());

            let power = settle_and_read(detector, handle, &self.config).map_err(|e| match e {
                Some(e) => acq(e),
                None => FpError::Acquisition(format!("no valid reading at {wl:.3} nm")),
            })?;

            let obs = Observation {
                wavelength_nm: wl,
                power,
            };
            self.observations.push(obs);
            self.emit(ScanEvent::Observation(obs));
            self.log(format!("Wavelength: {wl:.3} nm, Power: {power:.6} W"));
        }
        Ok(ScanOutcome::Completed)
    }

    /// Detector first, then source; every step runs even if an earlier one failed.
    fn teardown(&mut self, inst: &mut Instruments<P::Source, P::Detector>) {
        self.log("Closing communication ports...".into());

        if let Some(mut detector) = inst.detector.take() {
            if let Some(handle) = inst.handle.take() {
                self.swallow("closing powermeter", detector.close(handle));
            }
            if inst.detector_initialized {
                self.swallow("deinitializing powermeter", detector.deinitialize());
            }
        }

        if let Some(mut source) = inst.source.take() {
            if inst.output_enabled {
                self.swallow("disabling laser output", source.disable_output());
            }
            self.swallow("closing laser", source.close());
        }
    }

    fn swallow(&self, what: &str, result: Result<(), InstrumentError>) {
        if let Err(e) = result {
            warn!("Error {what}: {e}");
            self.emit(ScanEvent::Log(format!("Error {what}: {e}")));
        }
    }

    fn set_state(&self, state: ScanState) {
        info!("scan state: {state}");
        self.emit(ScanEvent::State(state));
    }

    fn log(&self, msg: String) {
        debug!("{msg}");
        self.emit(ScanEvent::Log(msg));
    }

    fn emit(&self, event: ScanEvent) {
        // A dropped receiver must not stop the sweep or its teardown.
        let _ = self.events.send(event);
    }
}

/// Read the detector `samples_per_point` times and keep the first valid
/// reading. Later reads only give the meter time to settle and are
/// discarded, not averaged.
///
/// `Err(None)` means every read in the batch was empty.
fn settle_and_read<D: PowerDetector>(
    detector: &mut D,
    handle: DetectorHandle,
    config: &ScanConfig,
) -> Result<f64, Option<InstrumentError>> {
    let mut first = None;
    for k in 0..config.samples_per_point {
        if k > 0 {
            thread::sleep(config.inter_sample_delay());
        }
        let reading = detector.sample(handle, config.max_count).map_err(Some)?;
        if first.is_none() && reading.is_valid() {
            first = Some(reading.measurement);
        }
    }
    first.ok_or(None)
}
