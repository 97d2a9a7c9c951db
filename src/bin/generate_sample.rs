use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use fp_loss::analysis::{ModeTable, Polarization};
use fp_loss::data::loader::{write_spectrum, DATA_FILE, RAW_SUFFIX, TE_SUFFIX, TM_SUFFIX};
use fp_loss::data::model::Spectrum;
use fp_loss::instrument::sim::{detected_power, Cavity, ReadingNoise, SourceProfile};
use fp_loss::state::W_TO_MW;

const CAVITY_LENGTH_M: f64 = 2e-3;
const LOSS_TE_CM: f64 = 1.5;
const LOSS_TM_CM: f64 = 2.5;
const NOISE: f64 = 0.002;

fn generate_spectrum(
    wavelengths: &[f64],
    profile: &SourceProfile,
    cavity: Option<&Cavity>,
    noise: &mut ReadingNoise,
) -> Vec<f64> {
    wavelengths
        .iter()
        .map(|&wl| noise.apply(detected_power(profile, cavity, wl)) * W_TO_MW)
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));

    let mut noise = ReadingNoise::new(42, NOISE);
    let profile = SourceProfile::default();

    // Wavelengths: 1549 → 1551 nm, step 1 pm
    let wavelengths: Vec<f64> = (0..=2000).map(|i| 1549.0 + i as f64 * 0.001).collect();

    let table = ModeTable::global();
    let te = Cavity::new(table.get(Polarization::Te), CAVITY_LENGTH_M, LOSS_TE_CM);
    let tm = Cavity::new(table.get(Polarization::Tm), CAVITY_LENGTH_M, LOSS_TM_CM);

    for (suffix, cavity) in [(TE_SUFFIX, Some(&te)), (TM_SUFFIX, Some(&tm)), (RAW_SUFFIX, None)] {
        let folder = out_dir.join(format!("sample_{suffix}"));
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("creating {}", folder.display()))?;

        let powers = generate_spectrum(&wavelengths, &profile, cavity, &mut noise);
        let spectrum = Spectrum::new(wavelengths.clone(), powers)?;
        let path = folder.join(DATA_FILE);
        write_spectrum(&path, &spectrum)?;
        info!("wrote {}", path.display());
    }

    println!(
        "Wrote sample reference set to {} (TE {LOSS_TE_CM} cm⁻¹, TM {LOSS_TM_CM} cm⁻¹)",
        out_dir.display()
    );
    Ok(())
}
