//! Instrument adapters: the command contract the scan controller drives.
//!
//! Concrete drivers (serial laser, vendor power-meter library) live outside
//! this crate; anything implementing these traits can be scanned. Each call
//! is expected to carry its own bounded timeout and report it as
//! [`InstrumentError::Timeout`].

pub mod sim;

pub use crate::error::InstrumentError;

/// Handle returned by [`PowerDetector::open`].
pub type DetectorHandle = i32;

/// Result of one detector read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// First measurement in the returned packet buffer (W).
    pub measurement: f64,
    /// Pulse period reported with the measurement.
    pub period: i32,
    /// Number of packets the device actually returned.
    pub count: usize,
}

impl Reading {
    /// A read counts only if the device returned data and it is a number.
    pub fn is_valid(&self) -> bool {
        self.count > 0 && self.measurement.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Device traits
// ---------------------------------------------------------------------------

/// A tunable laser.
pub trait TunableSource: Send {
    /// Command the emission wavelength in nm.
    fn set_wavelength(&mut self, nm: f64) -> Result<(), InstrumentError>;
    /// Query the wavelength the source reports it is emitting, in nm.
    fn get_wavelength(&mut self) -> Result<f64, InstrumentError>;
    fn enable_output(&mut self) -> Result<(), InstrumentError>;
    fn disable_output(&mut self) -> Result<(), InstrumentError>;
    /// Release the connection.
    fn close(&mut self) -> Result<(), InstrumentError>;
}

/// An optical power meter with a session-style driver library.
pub trait PowerDetector: Send {
    fn initialize(&mut self) -> Result<(), InstrumentError>;
    fn open(&mut self, device_index: i32) -> Result<DetectorHandle, InstrumentError>;
    /// Resynchronize communication; readings before this are not trusted.
    fn synchronize(&mut self, handle: DetectorHandle) -> Result<(), InstrumentError>;
    /// Fetch up to `max_count` packets and report the first.
    fn sample(&mut self, handle: DetectorHandle, max_count: usize) -> Result<Reading, InstrumentError>;
    fn close(&mut self, handle: DetectorHandle) -> Result<(), InstrumentError>;
    fn deinitialize(&mut self) -> Result<(), InstrumentError>;
}

/// Connects to a fresh source/detector pair for each scan.
pub trait InstrumentProvider: Send + Sync + 'static {
    type Source: TunableSource + 'static;
    type Detector: PowerDetector + 'static;

    fn connect_source(&self) -> Result<Self::Source, InstrumentError>;
    fn load_detector(&self) -> Result<Self::Detector, InstrumentError>;
}
