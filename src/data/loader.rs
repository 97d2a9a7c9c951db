use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, info};

use super::model::{ReferenceSet, Spectrum};
use crate::error::FpError;

/// File name of the two-column data file inside each scan folder.
pub const DATA_FILE: &str = "data.txt";

/// Header line written above the data columns.
pub const HEADER: [&str; 2] = ["Wavelength (nm)", "Power (mW)"];

/// Folder-name suffixes of the TE, TM and raw reference scans.
pub const TE_SUFFIX: &str = "losses_TE";
pub const TM_SUFFIX: &str = "losses_TM";
pub const RAW_SUFFIX: &str = "losses_raw";

// ---------------------------------------------------------------------------
// Two-column text format
// ---------------------------------------------------------------------------

/// Read a spectrum file: one header line, then `wavelength power` rows.
///
/// Columns may be separated by tabs or spaces. Rows with fewer than two
/// tokens or with non-numeric tokens are skipped.
pub fn read_spectrum(path: &Path) -> Result<Spectrum> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut wavelengths = Vec::new();
    let mut powers = Vec::new();
    let mut skipped = 0usize;

    for line in reader.lines().skip(1) {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        match parse_row(&line) {
            Some((wl, p)) => {
                wavelengths.push(wl);
                powers.push(p);
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("{}: skipped {skipped} malformed line(s)", path.display());
    }

    let spectrum = Spectrum::new(wavelengths, powers)
        .with_context(|| format!("loading spectrum from {}", path.display()))?;
    Ok(spectrum)
}

fn parse_row(line: &str) -> Option<(f64, f64)> {
    let mut tokens = line.split_whitespace();
    let wl = tokens.next()?.parse::<f64>().ok()?;
    let p = tokens.next()?.parse::<f64>().ok()?;
    Some((wl, p))
}

/// Write a spectrum as tab-separated text (`{:.3}` nm, `{:.6}` power).
pub fn write_spectrum(path: &Path, spectrum: &Spectrum) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(csv::Terminator::Any(b'\n'))
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    writer.write_record(HEADER).context("writing header")?;
    for (wl, p) in spectrum.iter() {
        writer
            .write_record([format!("{wl:.3}"), format!("{p:.6}")])
            .context("writing data row")?;
    }
    writer.flush().context("flushing data file")?;
    Ok(())
}

/// Save a finished scan under `<dir>/<timestamp>_losses/data.txt`.
///
/// Returns the path of the written data file.
pub fn save_scan(dir: &Path, spectrum: &Spectrum) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let folder = dir.join(format!("{timestamp}_losses"));
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("creating scan folder {}", folder.display()))?;

    let file_path = folder.join(DATA_FILE);
    write_spectrum(&file_path, spectrum)?;
    debug!("wrote {} rows to {}", spectrum.len(), file_path.display());
    Ok(file_path)
}

// ---------------------------------------------------------------------------
// Reference-set directory convention
// ---------------------------------------------------------------------------

/// Locations of the three sibling scan folders.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDirs {
    pub te: PathBuf,
    pub tm: PathBuf,
    pub raw: PathBuf,
}

/// Find the TE, TM and raw folders directly below `base`.
///
/// Entries are visited in name order and the first folder with a matching
/// suffix wins. A missing folder is reported as [`FpError::MissingReference`].
pub fn find_reference_dirs(base: &Path) -> Result<ReferenceDirs> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(base)
        .with_context(|| format!("listing {}", base.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let find = |suffix: &'static str| -> Result<PathBuf> {
        dirs.iter()
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(suffix))
            })
            .cloned()
            .ok_or_else(|| FpError::MissingReference(suffix.to_string()).into())
    };

    Ok(ReferenceDirs {
        te: find(TE_SUFFIX)?,
        tm: find(TM_SUFFIX)?,
        raw: find(RAW_SUFFIX)?,
    })
}

/// Load and grid-check the TE, TM and raw spectra found under `base`.
pub fn load_reference_set(base: &Path, tolerance: f64) -> Result<ReferenceSet> {
    let dirs = find_reference_dirs(base)?;
    let te = read_spectrum(&dirs.te.join(DATA_FILE))?;
    let tm = read_spectrum(&dirs.tm.join(DATA_FILE))?;
    let raw = read_spectrum(&dirs.raw.join(DATA_FILE))?;
    let set = ReferenceSet::new(te, tm, raw, tolerance)?;
    info!(
        "Loaded reference set from {} ({} points)",
        base.display(),
        set.raw.len()
    );
    Ok(set)
}
