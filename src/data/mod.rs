/// Data layer: spectra, persisted files, and normalization.
///
/// Architecture:
/// ```text
///   scan observations        data.txt (TE / TM / raw folders)
///          │                         │
///          ▼                         ▼
///    ┌──────────┐             ┌──────────┐
///    │  model   │◄────────────│  loader  │  parse file → Spectrum
///    └──────────┘             └──────────┘
///          │
///          ▼
///    ┌───────────┐
///    │ normalize │  measured / raw → NormalizedSpectrum
///    └───────────┘
/// ```

pub mod loader;
pub mod model;
pub mod normalize;
