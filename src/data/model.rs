use serde::{Deserialize, Serialize};

use crate::error::FpError;

// ---------------------------------------------------------------------------
// Observation – one acquired grid point
// ---------------------------------------------------------------------------

/// A single (wavelength, power) reading emitted by the scan controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Commanded source wavelength in nm.
    pub wavelength_nm: f64,
    /// Detector reading in W.
    pub power: f64,
}

// ---------------------------------------------------------------------------
// Spectrum – power versus wavelength
// ---------------------------------------------------------------------------

/// Ordered (wavelength, power) samples with strictly increasing wavelength.
///
/// Fields are private: a spectrum is validated once on construction and is
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    wavelengths: Vec<f64>,
    powers: Vec<f64>,
}

impl Spectrum {
    /// Build a spectrum, checking length and monotonicity.
    pub fn new(wavelengths: Vec<f64>, powers: Vec<f64>) -> Result<Self, FpError> {
        if wavelengths.len() != powers.len() {
            return Err(FpError::InvalidSpectrum(format!(
                "{} wavelengths but {} power values",
                wavelengths.len(),
                powers.len()
            )));
        }
        if wavelengths.len() < 2 {
            return Err(FpError::InvalidSpectrum(format!(
                "need at least 2 samples, got {}",
                wavelengths.len()
            )));
        }
        if let Some(i) = wavelengths.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(FpError::InvalidSpectrum(format!(
                "wavelength not strictly increasing at index {}: {} then {}",
                i + 1,
                wavelengths[i],
                wavelengths[i + 1]
            )));
        }
        Ok(Self {
            wavelengths,
            powers,
        })
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn powers(&self) -> &[f64] {
        &self.powers
    }

    /// Number of samples (always ≥ 2).
    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// Sampling step taken from the first two samples.
    pub fn step(&self) -> f64 {
        self.wavelengths[1] - self.wavelengths[0]
    }

    /// Iterate over `(wavelength, power)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .copied()
            .zip(self.powers.iter().copied())
    }

    /// Same grid, new power values.
    pub(crate) fn with_powers(&self, powers: Vec<f64>) -> Self {
        debug_assert_eq!(powers.len(), self.wavelengths.len());
        Self {
            wavelengths: self.wavelengths.clone(),
            powers,
        }
    }
}

// ---------------------------------------------------------------------------
// NormalizedSpectrum – measured / reference
// ---------------------------------------------------------------------------

/// Output of the normalizer; zero-reference samples hold exactly 0.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSpectrum(Spectrum);

impl NormalizedSpectrum {
    pub(crate) fn from_spectrum(spectrum: Spectrum) -> Self {
        Self(spectrum)
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.0
    }

    pub fn into_inner(self) -> Spectrum {
        self.0
    }
}

impl std::ops::Deref for NormalizedSpectrum {
    type Target = Spectrum;

    fn deref(&self) -> &Spectrum {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ReferenceSet – TE, TM and raw spectra on one grid
// ---------------------------------------------------------------------------

/// The three spectra of one measurement, guaranteed co-sampled.
#[derive(Debug, Clone)]
pub struct ReferenceSet {
    pub te: Spectrum,
    pub tm: Spectrum,
    pub raw: Spectrum,
}

impl ReferenceSet {
    /// Bundle three spectra; any grid mismatch against `raw` is an error.
    pub fn new(te: Spectrum, tm: Spectrum, raw: Spectrum, tolerance: f64) -> Result<Self, FpError> {
        check_grid(&te, &raw, tolerance)?;
        check_grid(&tm, &raw, tolerance)?;
        Ok(Self { te, tm, raw })
    }
}

/// Verify two spectra share a wavelength grid.
///
/// `tolerance` is a fraction of the sampling step of `reference`; the
/// comparison at every index is absolute against that product.
pub fn check_grid(measured: &Spectrum, reference: &Spectrum, tolerance: f64) -> Result<(), FpError> {
    let abs_tol = tolerance * reference.step().abs();
    let (m, r) = (measured.wavelengths(), reference.wavelengths());
    if m.len() != r.len() {
        let index = m.len().min(r.len());
        return Err(FpError::GridMismatch {
            index,
            expected: r.get(index).copied().unwrap_or(f64::NAN),
            found: m.get(index).copied().unwrap_or(f64::NAN),
        });
    }
    match m.iter().zip(r).position(|(a, b)| (a - b).abs() > abs_tol) {
        Some(index) => Err(FpError::GridMismatch {
            index,
            expected: r[index],
            found: m[index],
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1549.0 + i as f64 * 0.05).collect()
    }

    #[test]
    fn rejects_short_and_unordered_spectra() {
        assert!(matches!(
            Spectrum::new(vec![1.0], vec![1.0]),
            Err(FpError::InvalidSpectrum(_))
        ));
        assert!(matches!(
            Spectrum::new(vec![1.0, 1.0, 2.0], vec![0.0; 3]),
            Err(FpError::InvalidSpectrum(_))
        ));
        assert!(matches!(
            Spectrum::new(vec![1.0, 2.0], vec![0.0; 3]),
            Err(FpError::InvalidSpectrum(_))
        ));
    }

    #[test]
    fn grid_check_reports_first_bad_index() {
        let reference = Spectrum::new(grid(5), vec![1.0; 5]).unwrap();
        let mut shifted = grid(5);
        shifted[3] += 0.001;
        let measured = Spectrum::new(shifted, vec![1.0; 5]).unwrap();

        match check_grid(&measured, &reference, 1e-6) {
            Err(FpError::GridMismatch { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected grid mismatch, got {other:?}"),
        }
    }

    #[test]
    fn grid_check_accepts_rounding_noise() {
        let reference = Spectrum::new(grid(5), vec![1.0; 5]).unwrap();
        let jitter: Vec<f64> = grid(5).iter().map(|w| w + 1e-9).collect();
        let measured = Spectrum::new(jitter, vec![2.0; 5]).unwrap();
        assert!(check_grid(&measured, &reference, 1e-6).is_ok());
    }

    #[test]
    fn reference_set_rejects_length_mismatch() {
        let raw = Spectrum::new(grid(5), vec![1.0; 5]).unwrap();
        let te = Spectrum::new(grid(5), vec![1.0; 5]).unwrap();
        let tm = Spectrum::new(grid(4), vec![1.0; 4]).unwrap();
        assert!(matches!(
            ReferenceSet::new(te, tm, raw, 1e-6),
            Err(FpError::GridMismatch { index: 4, .. })
        ));
    }
}
