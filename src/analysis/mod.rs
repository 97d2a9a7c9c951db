//! Fringe analysis: extrema → contrast → loss.
//!
//! ```text
//!   NormalizedSpectrum ──► fringes::find_extrema ──► Extrema
//!                                                      │
//!   mode::ModeTable ──► ModeParameters ───────────────►│
//!                                                      ▼
//!                                           loss::calculate_loss ──► LossResult
//! ```

pub mod fringes;
pub mod loss;
pub mod mode;

use log::info;

use crate::config::AnalysisConfig;
use crate::data::model::Spectrum;
use crate::error::FpError;

pub use fringes::{find_extrema, Extrema};
pub use loss::{calculate_loss, LossResult};
pub use mode::{mode_parameters, ModeParameters, ModeTable, Polarization};

/// Run extrema detection and the loss formula for one normalized spectrum.
pub fn analyze_mode(
    spectrum: &Spectrum,
    mode: Polarization,
    config: &AnalysisConfig,
) -> Result<LossResult, FpError> {
    let params = ModeTable::global().get(mode);
    let extrema = find_extrema(spectrum, config.peak_distance_nm);
    info!(
        "[{mode}] {} maxima, {} minima",
        extrema.maxima.len(),
        extrema.minima.len()
    );
    calculate_loss(spectrum, &extrema, &params)
}
