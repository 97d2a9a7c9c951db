use serde::{Deserialize, Serialize};

use super::fringes::Extrema;
use super::mode::ModeParameters;
use crate::data::model::Spectrum;
use crate::error::FpError;

/// Maxima needed to address the 1st, 2nd, 5th and 6th fringe.
pub const MIN_MAXIMA: usize = 6;

const NM_TO_M: f64 = 1e-9;
const PER_M_TO_PER_CM: f64 = 1e-2;

// ---------------------------------------------------------------------------
// LossResult
// ---------------------------------------------------------------------------

/// Propagation loss and the intermediates it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossResult {
    /// Loss coefficient in cm⁻¹.
    pub loss_cm: f64,
    /// Fringe contrast K.
    pub contrast: f64,
    /// Facet reflectivity inferred from K.
    pub r_tilde: f64,
    /// Cavity length in m.
    pub length_m: f64,
    /// Spacing of the 5th and 6th maxima in nm (diagnostic only).
    pub fsr_nm: f64,
}

// ---------------------------------------------------------------------------
// Loss calculation
// ---------------------------------------------------------------------------

/// Fringe-contrast loss of one spectrum.
///
/// The cavity length comes from the first two maxima,
/// `L = λ₀² / (2 n_eff (λ₁ - λ₀))`, and the loss compares the known facet
/// reflectivity with the one implied by the contrast: `ln(R / R̃) / L`.
pub fn calculate_loss(
    spectrum: &Spectrum,
    extrema: &Extrema,
    params: &ModeParameters,
) -> Result<LossResult, FpError> {
    let Extrema { maxima, minima } = extrema;
    if maxima.len() < MIN_MAXIMA || minima.is_empty() {
        return Err(FpError::InsufficientFringes {
            maxima: maxima.len(),
            minima: minima.len(),
        });
    }

    let wl = spectrum.wavelengths();
    let power = spectrum.powers();

    let mean_max = mean(maxima.iter().map(|&i| power[i]));
    let mean_min = mean(minima.iter().map(|&i| power[i]));

    let contrast = fringe_contrast(mean_max, mean_min)?;
    let r_tilde = (1.0 - (1.0 - contrast * contrast).sqrt()) / contrast;

    let loc: Vec<f64> = maxima.iter().map(|&i| wl[i]).collect();
    let fsr_nm = loc[5] - loc[4];
    let length_m = loc[0] * loc[0] / (2.0 * params.n_eff * (loc[1] - loc[0])) * NM_TO_M;

    let ratio = params.reflectivity / r_tilde;
    if !(r_tilde > 0.0) || !(ratio > 0.0) {
        return Err(FpError::InvalidLossDomain {
            r: params.reflectivity,
            r_tilde,
        });
    }
    let loss_cm = ratio.ln() / length_m * PER_M_TO_PER_CM;

    Ok(LossResult {
        loss_cm,
        contrast,
        r_tilde,
        length_m,
        fsr_nm,
    })
}

/// `K = (max - min) / (max + min)`, required to be non-zero with `|K| < 1`.
///
/// A negative K (maxima darker than minima) is accepted here and rejected
/// by [`calculate_loss`] as [`FpError::InvalidLossDomain`], since it gives
/// `R̃ < 0`.
pub fn fringe_contrast(mean_max: f64, mean_min: f64) -> Result<f64, FpError> {
    let sum = mean_max + mean_min;
    if sum == 0.0 {
        return Err(FpError::DegenerateContrast { contrast: f64::NAN });
    }
    let contrast = (mean_max - mean_min) / sum;
    if contrast != 0.0 && contrast.abs() < 1.0 {
        Ok(contrast)
    } else {
        Err(FpError::DegenerateContrast { contrast })
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len() as f64;
    values.sum::<f64>() / n
}
