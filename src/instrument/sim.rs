use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{DetectorHandle, InstrumentError, InstrumentProvider, PowerDetector, Reading, TunableSource};
use crate::analysis::ModeParameters;

// ---------------------------------------------------------------------------
// Cavity model
// ---------------------------------------------------------------------------

/// A lossy linear Fabry-Perot waveguide cavity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cavity {
    pub reflectivity: f64,
    pub n_eff: f64,
    pub length_m: f64,
    /// Propagation loss in cm⁻¹.
    pub loss_cm: f64,
}

impl Cavity {
    pub fn new(params: ModeParameters, length_m: f64, loss_cm: f64) -> Self {
        Self {
            reflectivity: params.reflectivity,
            n_eff: params.n_eff,
            length_m,
            loss_cm,
        }
    }

    /// Airy transmission at `wavelength_nm`.
    ///
    /// `T = (1-R)² A / ((1-RA)² + 4RA sin²(2π n L / λ))` with single-pass
    /// amplitude `A = exp(-αL)`.
    pub fn transmission(&self, wavelength_nm: f64) -> f64 {
        let r = self.reflectivity;
        let a = (-self.loss_cm * self.length_m * 100.0).exp();
        let phase = 2.0 * std::f64::consts::PI * self.n_eff * self.length_m / (wavelength_nm * 1e-9);
        let ra = r * a;
        (1.0 - r).powi(2) * a / ((1.0 - ra).powi(2) + 4.0 * ra * phase.sin().powi(2))
    }
}

/// Laser power reaching the detector without a sample, in W.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProfile {
    pub power_w: f64,
    /// Linear power slope relative to 1550 nm, per nm.
    pub tilt_per_nm: f64,
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self {
            power_w: 1e-3,
            tilt_per_nm: 0.02,
        }
    }
}

impl SourceProfile {
    pub fn power_at(&self, wavelength_nm: f64) -> f64 {
        self.power_w * (1.0 + self.tilt_per_nm * (wavelength_nm - 1550.0))
    }
}

/// Detected power for a wavelength, with or without a cavity in the beam.
pub fn detected_power(profile: &SourceProfile, cavity: Option<&Cavity>, wavelength_nm: f64) -> f64 {
    let t = cavity.map_or(1.0, |c| c.transmission(wavelength_nm));
    profile.power_at(wavelength_nm) * t
}

// ---------------------------------------------------------------------------
// Deterministic noise
// ---------------------------------------------------------------------------

/// Seeded multiplicative Gaussian noise, `x · (1 + σ z)`.
#[derive(Debug, Clone)]
pub struct ReadingNoise {
    rng: StdRng,
    relative: f64,
}

impl ReadingNoise {
    pub fn new(seed: u64, relative: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            relative,
        }
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        if self.relative <= 0.0 {
            return value;
        }
        value * (1.0 + self.relative * self.standard_normal())
    }

    fn standard_normal(&mut self) -> f64 {
        let u: f64 = self.rng.random_range(f64::EPSILON..1.0);
        let v: f64 = self.rng.random();
        (-2.0 * u.ln()).sqrt() * (TAU * v).cos()
    }
}

// ---------------------------------------------------------------------------
// Simulated bench
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Beam {
    wavelength_nm: Option<f64>,
    enabled: bool,
}

fn lock(beam: &Mutex<Beam>) -> MutexGuard<'_, Beam> {
    beam.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Laser + power meter pair sharing one simulated beam path.
#[derive(Debug, Clone)]
pub struct SimulatedBench {
    pub profile: SourceProfile,
    /// `None` measures the bare source, as for a raw reference scan.
    pub cavity: Option<Cavity>,
    /// Relative Gaussian noise on each reading.
    pub noise: f64,
    pub seed: u64,
    beam: Arc<Mutex<Beam>>,
}

impl SimulatedBench {
    pub fn new(cavity: Option<Cavity>) -> Self {
        Self {
            profile: SourceProfile::default(),
            cavity,
            noise: 0.0,
            seed: 42,
            beam: Arc::new(Mutex::new(Beam::default())),
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }
}

impl InstrumentProvider for SimulatedBench {
    type Source = SimulatedLaser;
    type Detector = SimulatedPowerMeter;

    fn connect_source(&self) -> Result<SimulatedLaser, InstrumentError> {
        *lock(&self.beam) = Beam::default();
        Ok(SimulatedLaser {
            beam: Arc::clone(&self.beam),
            open: true,
        })
    }

    fn load_detector(&self) -> Result<SimulatedPowerMeter, InstrumentError> {
        Ok(SimulatedPowerMeter {
            bench: self.clone(),
            noise: ReadingNoise::new(self.seed, self.noise),
            initialized: false,
            handle: None,
        })
    }
}

/// Simulated tunable laser.
#[derive(Debug)]
pub struct SimulatedLaser {
    beam: Arc<Mutex<Beam>>,
    open: bool,
}

impl SimulatedLaser {
    fn ensure_open(&self, op: &'static str) -> Result<(), InstrumentError> {
        if self.open {
            Ok(())
        } else {
            Err(InstrumentError::failure(op, "laser connection is closed"))
        }
    }
}

impl TunableSource for SimulatedLaser {
    fn set_wavelength(&mut self, nm: f64) -> Result<(), InstrumentError> {
        self.ensure_open("set_wavelength")?;
        lock(&self.beam).wavelength_nm = Some(nm);
        Ok(())
    }

    fn get_wavelength(&mut self) -> Result<f64, InstrumentError> {
        self.ensure_open("get_wavelength")?;
        lock(&self.beam)
            .wavelength_nm
            .ok_or_else(|| InstrumentError::failure("get_wavelength", "no wavelength set"))
    }

    fn enable_output(&mut self) -> Result<(), InstrumentError> {
        self.ensure_open("enable_output")?;
        lock(&self.beam).enabled = true;
        Ok(())
    }

    fn disable_output(&mut self) -> Result<(), InstrumentError> {
        self.ensure_open("disable_output")?;
        lock(&self.beam).enabled = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), InstrumentError> {
        self.open = false;
        Ok(())
    }
}

/// Simulated power meter reading the bench's beam; reads 0 W while the
/// laser output is off.
#[derive(Debug)]
pub struct SimulatedPowerMeter {
    bench: SimulatedBench,
    noise: ReadingNoise,
    initialized: bool,
    handle: Option<DetectorHandle>,
}

impl SimulatedPowerMeter {
    fn check_handle(&self, op: &'static str, handle: DetectorHandle) -> Result<(), InstrumentError> {
        match self.handle {
            Some(h) if h == handle => Ok(()),
            _ => Err(InstrumentError::failure(op, format!("invalid handle {handle}"))),
        }
    }
}

impl PowerDetector for SimulatedPowerMeter {
    fn initialize(&mut self) -> Result<(), InstrumentError> {
        self.initialized = true;
        Ok(())
    }

    fn open(&mut self, device_index: i32) -> Result<DetectorHandle, InstrumentError> {
        if !self.initialized {
            return Err(InstrumentError::failure("open", "library not initialized"));
        }
        if device_index != 0 {
            return Err(InstrumentError::failure(
                "open",
                format!("no device at index {device_index}"),
            ));
        }
        let handle = 1;
        self.handle = Some(handle);
        Ok(handle)
    }

    fn synchronize(&mut self, handle: DetectorHandle) -> Result<(), InstrumentError> {
        self.check_handle("synchronize", handle)
    }

    fn sample(&mut self, handle: DetectorHandle, max_count: usize) -> Result<Reading, InstrumentError> {
        self.check_handle("sample", handle)?;
        let power = {
            let beam = lock(&self.bench.beam);
            match (beam.enabled, beam.wavelength_nm) {
                (true, Some(wl)) => detected_power(&self.bench.profile, self.bench.cavity.as_ref(), wl),
                _ => 0.0,
            }
        };
        let measurement = self.noise.apply(power);
        debug!("simulated read: {measurement:.6e} W");
        Ok(Reading {
            measurement,
            period: 1,
            count: max_count.min(1),
        })
    }

    fn close(&mut self, handle: DetectorHandle) -> Result<(), InstrumentError> {
        self.check_handle("close", handle)?;
        self.handle = None;
        Ok(())
    }

    fn deinitialize(&mut self) -> Result<(), InstrumentError> {
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze_mode, mode_parameters, Polarization};
    use crate::config::AnalysisConfig;
    use crate::data::model::Spectrum;
    use crate::data::normalize::normalize;

    #[test]
    fn noise_is_seeded_and_centred() {
        let mut a = ReadingNoise::new(7, 0.01);
        let mut b = ReadingNoise::new(7, 0.01);
        let xs: Vec<f64> = (0..2000).map(|_| a.apply(1.0)).collect();
        let ys: Vec<f64> = (0..2000).map(|_| b.apply(1.0)).collect();
        assert_eq!(xs, ys);

        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        assert!((mean - 1.0).abs() < 2e-3, "mean {mean}");
        assert!(xs.iter().any(|&x| x != 1.0));

        let mut quiet = ReadingNoise::new(7, 0.0);
        assert_eq!(quiet.apply(0.25), 0.25);
    }

    #[test]
    fn lossless_cavity_peaks_at_unity() {
        let cavity = Cavity::new(mode_parameters("TM").unwrap(), 2e-3, 0.0);
        let peak = (0..2000)
            .map(|i| cavity.transmission(1549.0 + i as f64 * 0.001))
            .fold(f64::MIN, f64::max);
        assert!((peak - 1.0).abs() < 1e-3);
    }

    #[test]
    fn analysis_recovers_simulated_loss() {
        let params = mode_parameters("TM").unwrap();
        let cavity = Cavity::new(params, 2e-3, 2.0);
        let profile = SourceProfile::default();

        let wl: Vec<f64> = (0..=2000).map(|i| 1549.0 + i as f64 * 0.001).collect();
        let measured: Vec<f64> = wl.iter().map(|&w| detected_power(&profile, Some(&cavity), w)).collect();
        let raw: Vec<f64> = wl.iter().map(|&w| detected_power(&profile, None, w)).collect();

        let measured = Spectrum::new(wl.clone(), measured).unwrap();
        let raw = Spectrum::new(wl, raw).unwrap();
        let ratio = normalize(&measured, &raw).unwrap();

        let result = analyze_mode(&ratio, Polarization::Tm, &AnalysisConfig::default()).unwrap();
        assert!((result.loss_cm - 2.0).abs() < 0.1, "loss {}", result.loss_cm);
        assert!((result.length_m - 2e-3).abs() < 2e-5);
    }

    #[test]
    fn meter_follows_laser_wavelength() {
        let bench = SimulatedBench::new(None);
        let mut laser = bench.connect_source().unwrap();
        let mut meter = bench.load_detector().unwrap();

        meter.initialize().unwrap();
        let h = meter.open(0).unwrap();
        meter.synchronize(h).unwrap();
        assert_eq!(meter.sample(h, 8).unwrap().measurement, 0.0);

        assert!(laser.get_wavelength().is_err());
        laser.enable_output().unwrap();
        laser.set_wavelength(1550.0).unwrap();
        assert_eq!(laser.get_wavelength().unwrap(), 1550.0);
        let reading = meter.sample(h, 8).unwrap();
        assert!(reading.is_valid());
        assert!((reading.measurement - 1e-3).abs() < 1e-12);

        assert!(meter.synchronize(h + 1).is_err());

        laser.close().unwrap();
        assert!(laser.get_wavelength().is_err());
    }
}
