use super::model::{check_grid, NormalizedSpectrum, Spectrum};
use crate::error::FpError;

/// Default grid tolerance, as a fraction of the sampling step.
pub const DEFAULT_GRID_TOLERANCE: f64 = 1e-6;

/// Divide `measured` by `reference` sample by sample.
///
/// The grids must agree within `DEFAULT_GRID_TOLERANCE` of the step; there is
/// no interpolation. Where the reference is exactly zero the result is 0.
pub fn normalize(measured: &Spectrum, reference: &Spectrum) -> Result<NormalizedSpectrum, FpError> {
    normalize_with_tolerance(measured, reference, DEFAULT_GRID_TOLERANCE)
}

/// [`normalize`] with an explicit grid tolerance.
pub fn normalize_with_tolerance(
    measured: &Spectrum,
    reference: &Spectrum,
    tolerance: f64,
) -> Result<NormalizedSpectrum, FpError> {
    check_grid(measured, reference, tolerance)?;

    let ratio = measured
        .powers()
        .iter()
        .zip(reference.powers())
        .map(|(&m, &r)| if r == 0.0 { 0.0 } else { m / r })
        .collect();

    Ok(NormalizedSpectrum::from_spectrum(measured.with_powers(ratio)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(powers: &[f64]) -> Spectrum {
        let wl = (0..powers.len()).map(|i| 1549.0 + i as f64 * 0.01).collect();
        Spectrum::new(wl, powers.to_vec()).unwrap()
    }

    #[test]
    fn divides_elementwise() {
        let out = normalize(&spectrum(&[1.0, 3.0, 5.0]), &spectrum(&[2.0, 3.0, 10.0])).unwrap();
        assert_eq!(out.powers(), &[0.5, 1.0, 0.5]);
        assert_eq!(out.wavelengths(), spectrum(&[0.0; 3]).wavelengths());
    }

    #[test]
    fn zero_reference_gives_exact_zero() {
        let out = normalize(
            &spectrum(&[1.0, 0.0, -2.0, 4.0]),
            &spectrum(&[0.0, 0.0, 0.0, 2.0]),
        )
        .unwrap();
        assert_eq!(out.powers(), &[0.0, 0.0, 0.0, 2.0]);
        assert!(out.powers().iter().all(|p| !p.is_nan()));
    }

    #[test]
    fn mismatched_grid_aborts() {
        let measured = spectrum(&[1.0, 1.0, 1.0]);
        let reference = Spectrum::new(vec![1549.0, 1549.02, 1549.04], vec![1.0; 3]).unwrap();
        assert!(matches!(
            normalize(&measured, &reference),
            Err(FpError::GridMismatch { index: 1, .. })
        ));
    }
}
