use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::FpError;

// ---------------------------------------------------------------------------
// Polarization – the two guided modes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Polarization {
    #[serde(rename = "TE")]
    Te,
    #[serde(rename = "TM")]
    Tm,
}

impl Polarization {
    pub const ALL: [Polarization; 2] = [Polarization::Te, Polarization::Tm];
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarization::Te => write!(f, "TE"),
            Polarization::Tm => write!(f, "TM"),
        }
    }
}

/// Case-insensitive: `"te"`, `"TE"` and `"Te"` all parse.
impl FromStr for Polarization {
    type Err = FpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TE" => Ok(Polarization::Te),
            "TM" => Ok(Polarization::Tm),
            _ => Err(FpError::InvalidMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ModeParameters / ModeTable
// ---------------------------------------------------------------------------

/// Facet reflectivity and effective index of one guided mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeParameters {
    /// Known facet reflectivity, in (0, 1).
    pub reflectivity: f64,
    /// Effective refractive index, > 1.
    pub n_eff: f64,
}

/// Read-only lookup from polarization to [`ModeParameters`].
#[derive(Debug, Clone)]
pub struct ModeTable {
    entries: BTreeMap<Polarization, ModeParameters>,
}

impl ModeTable {
    fn standard() -> Self {
        let entries = BTreeMap::from([
            (
                Polarization::Te,
                ModeParameters {
                    reflectivity: 0.2956,
                    n_eff: 3.087435,
                },
            ),
            (
                Polarization::Tm,
                ModeParameters {
                    reflectivity: 0.2287,
                    n_eff: 3.073054,
                },
            ),
        ]);
        Self { entries }
    }

    /// The process-wide table, built on first use.
    pub fn global() -> &'static ModeTable {
        static TABLE: OnceLock<ModeTable> = OnceLock::new();
        TABLE.get_or_init(ModeTable::standard)
    }

    pub fn get(&self, mode: Polarization) -> ModeParameters {
        // Both variants are inserted by `standard`.
        self.entries[&mode]
    }

    /// Look a mode up by name, failing with [`FpError::InvalidMode`].
    pub fn lookup(&self, name: &str) -> Result<ModeParameters, FpError> {
        let mode: Polarization = name.parse()?;
        Ok(self.get(mode))
    }
}

/// Shorthand for `ModeTable::global().lookup(name)`.
pub fn mode_parameters(name: &str) -> Result<ModeParameters, FpError> {
    ModeTable::global().lookup(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_modes() {
        let te = mode_parameters("TE").unwrap();
        assert_eq!(te.reflectivity, 0.2956);
        assert_eq!(te.n_eff, 3.087435);

        let tm = mode_parameters("tm").unwrap();
        assert_eq!(tm.reflectivity, 0.2287);
        assert_eq!(tm.n_eff, 3.073054);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert_eq!(
            mode_parameters("TEM00"),
            Err(FpError::InvalidMode("TEM00".into()))
        );
    }

    #[test]
    fn table_entries_are_physical() {
        for mode in Polarization::ALL {
            let p = ModeTable::global().get(mode);
            assert!(p.reflectivity > 0.0 && p.reflectivity < 1.0);
            assert!(p.n_eff > 1.0);
        }
    }
}
