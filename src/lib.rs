//! Waveguide propagation loss by the Fabry-Perot fringe-contrast method.
//!
//! A tunable laser is swept across a wavelength range while a power meter
//! records transmitted power ([`scan`]). The resulting spectrum is divided by
//! a raw reference ([`data::normalize`]), its fringe maxima and minima are
//! located ([`analysis::fringes`]) and the contrast between them gives the
//! loss coefficient in cm⁻¹ ([`analysis::loss`]).

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod scan;
pub mod state;

pub use error::{FpError, InstrumentError};
