//! Beamlock command-line entry point.
//!
//! Runs one tracking-plus-acquisition pass over the mock bench. Real hardware
//! backends plug in through the traits in [`beamlock::hardware`]; the mock rig
//! exercises the full coordinator, including persistence.

use beamlock::config::Settings;
use beamlock::hardware::mock::{MockAcquisition, MockCamera, MockMirror};
use beamlock::sync::{StopReason, StopSignal};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "beamlock", version, about = "Camera-steered beam lock with chunked vibrometer acquisition")]
struct Cli {
    /// Path to a TOML configuration file (defaults to ./beamlock.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the run time limit, e.g. "30s" or "2m".
    #[arg(long, value_parser = humantime::parse_duration)]
    time_limit: Option<std::time::Duration>,

    /// Override the output directory for result blocks.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("run failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(limit) = cli.time_limit {
        settings.run.time_limit = limit;
    }
    if let Some(dir) = cli.data_dir {
        settings.run.data_dir = dir;
    }

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        if handler_stop.request(StopReason::Operator) {
            info!("interrupt received, stopping run");
        }
    })?;

    let camera = MockCamera::new(
        settings.camera.width,
        settings.camera.height,
        settings.tracking.template_radius,
    )
    .drift_amplitude(8.0);
    let device = MockAcquisition::ramp(settings.acquisition.sample_count).primary_scale(1.0e-3);
    let mirror = MockMirror::new();

    info!(
        "starting run: mode={:?}, time_limit={:?}",
        settings.acquisition.mode, settings.run.time_limit
    );
    let report = beamlock::run::execute(&settings, camera, device, mirror, stop)?;

    info!(
        "run complete: {} block(s), {} file(s) written, stop reason {:?}",
        report.blocks.len(),
        report.persisted.len(),
        report.stop_reason
    );
    for path in &report.persisted {
        info!("  {}", path.display());
    }
    if report.failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("run finished with failures: {}", report.failures.join("; "))
    }
}
