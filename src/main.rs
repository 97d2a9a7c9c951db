use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use fp_loss::analysis::{analyze_mode, mode_parameters, LossResult, Polarization};
use fp_loss::config::{load_json, AnalysisConfig, ScanConfig, Settings};
use fp_loss::data::loader::load_reference_set;
use fp_loss::data::normalize::normalize_with_tolerance;
use fp_loss::instrument::sim::{Cavity, SimulatedBench};
use fp_loss::scan::{ScanController, ScanOutcome};
use fp_loss::state::ScanSession;

#[derive(Parser, Debug)]
#[command(name = "fp-loss")]
#[command(about = "Fabry-Perot fringe-contrast waveguide loss measurement")]
struct Cli {
    /// JSON settings file with optional "scan" and "analysis" sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute TE and TM losses from a folder holding *losses_TE, *losses_TM and *losses_raw scans
    Analyze {
        base_dir: PathBuf,

        /// Minimum distance between two fringe maxima (nm)
        #[arg(long)]
        peak_distance_nm: Option<f64>,

        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sweep the simulated bench and save the spectrum
    Scan {
        #[arg(long)]
        start: Option<f64>,
        #[arg(long)]
        stop: Option<f64>,
        #[arg(long)]
        step: Option<f64>,
        #[arg(long)]
        settle_ms: Option<u64>,

        /// Folder under which the timestamped scan folder is created
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Sample in the beam: te, tm, or raw (no sample)
        #[arg(long, default_value = "te")]
        mode: String,

        /// Simulated propagation loss (cm⁻¹)
        #[arg(long, default_value = "2.0")]
        loss_cm: f64,

        /// Simulated cavity length (mm)
        #[arg(long, default_value = "2.0")]
        length_mm: f64,

        /// Relative noise on each simulated reading
        #[arg(long, default_value = "0.0")]
        noise: f64,
    },
}

#[derive(Serialize)]
struct ModeReport {
    mode: Polarization,
    #[serde(flatten)]
    result: LossResult,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings: Settings = match &cli.config {
        Some(path) => load_json(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Analyze {
            base_dir,
            peak_distance_nm,
            json,
        } => {
            let mut analysis = settings.analysis;
            if let Some(d) = peak_distance_nm {
                analysis.peak_distance_nm = d;
            }
            analyze(&base_dir, &analysis, json)
        }
        Command::Scan {
            start,
            stop,
            step,
            settle_ms,
            output,
            mode,
            loss_cm,
            length_mm,
            noise,
        } => {
            let mut config = settings.scan;
            config.start_nm = start.unwrap_or(config.start_nm);
            config.stop_nm = stop.unwrap_or(config.stop_nm);
            config.step_nm = step.unwrap_or(config.step_nm);
            config.settle_delay_ms = settle_ms.unwrap_or(config.settle_delay_ms);

            let cavity = if mode.eq_ignore_ascii_case("raw") {
                None
            } else {
                Some(Cavity::new(mode_parameters(&mode)?, length_mm * 1e-3, loss_cm))
            };
            let bench = SimulatedBench::new(cavity).with_noise(noise);
            scan(bench, config, &output)
        }
    }
}

fn analyze(base_dir: &Path, config: &AnalysisConfig, json: bool) -> Result<()> {
    let set = load_reference_set(base_dir, config.grid_tolerance)?;

    let mut reports = Vec::new();
    for (mode, measured) in [(Polarization::Te, &set.te), (Polarization::Tm, &set.tm)] {
        let ratio = normalize_with_tolerance(measured, &set.raw, config.grid_tolerance)?;
        let result = analyze_mode(&ratio, mode, config)
            .with_context(|| format!("computing {mode} loss"))?;
        reports.push(ModeReport { mode, result });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for r in &reports {
            println!("[{}] Optical loss: {:.3} cm⁻¹", r.mode, r.result.loss_cm);
        }
    }
    Ok(())
}

fn scan(bench: SimulatedBench, config: ScanConfig, output: &Path) -> Result<()> {
    let controller = Arc::new(ScanController::new(bench));

    // Ctrl-C stops the sweep; teardown and saving still run below.
    let stop = Arc::clone(&controller);
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping scan...");
        stop.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let handle = controller.start(config)?;
    info!("Scan started...");

    let mut session = ScanSession::default();
    session.follow(&handle, |line| println!("{line}"));
    let report = handle.wait();

    match session.save(output)? {
        Some(path) => println!("Data saved at : {}", path.display()),
        None => println!("No data to save."),
    }

    match report.outcome {
        ScanOutcome::Faulted(e) => Err(e.into()),
        _ => Ok(()),
    }
}
