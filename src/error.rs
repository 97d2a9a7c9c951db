use thiserror::Error;

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Every failure the acquisition and analysis layers can report.
///
/// Bring-up errors (`DeviceInit`, `DeviceHandshake`) and sweep failures
/// (`Acquisition`) are caught by the scan controller and surfaced as events;
/// the analysis errors are returned to the caller of each computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FpError {
    #[error("Invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid spectrum: {0}")]
    InvalidSpectrum(String),

    #[error("Instrument initialisation failed: {0}")]
    DeviceInit(String),

    #[error("Instrument handshake failed: {0}")]
    DeviceHandshake(String),

    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("Wavelength grids differ at index {index}: {expected} vs {found}")]
    GridMismatch {
        index: usize,
        expected: f64,
        found: f64,
    },

    #[error("Not enough fringes: found {maxima} maxima and {minima} minima (need at least 6 and 1)")]
    InsufficientFringes { maxima: usize, minima: usize },

    #[error("Fringe contrast {contrast} is zero or |K| >= 1")]
    DegenerateContrast { contrast: f64 },

    #[error("Loss logarithm undefined for R = {r}, estimated R = {r_tilde}")]
    InvalidLossDomain { r: f64, r_tilde: f64 },

    #[error("Invalid mode '{0}'. Use 'TE' or 'TM'.")]
    InvalidMode(String),

    #[error("Reference directory ending in '{0}' is missing")]
    MissingReference(String),

    #[error("A scan is already running")]
    ScanAlreadyRunning,
}

/// Errors reported by an instrument adapter for a single device call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("{op} timed out")]
    Timeout { op: &'static str },

    #[error("{op} failed: {reason}")]
    Failure { op: &'static str, reason: String },
}

impl InstrumentError {
    pub fn failure(op: &'static str, reason: impl Into<String>) -> Self {
        InstrumentError::Failure {
            op,
            reason: reason.into(),
        }
    }
}
