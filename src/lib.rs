pub mod cli;
pub mod db;
pub mod device;
pub mod error;
pub mod exit_codes;
pub mod operator;
pub mod settings;
pub mod sweep;
pub mod utils;

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use db::MeasurementStore;
use device::open_reader;
use error::SweepError;
use operator::{watch_ctrl_c, KeypressWatcher};
use settings::Profile;
use sweep::{CaptureConfig, RunSummary, SweepConfig, SweepController};

/// Parses the command line, runs the requested mode and returns the process
/// exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    match execute(cli) {
        Ok(_) => exit_codes::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_codes::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<RunSummary> {
    let watch_keys = !cli.no_keyboard && std::io::stdin().is_terminal();
    utils::logging::init(cli.verbose, watch_keys);

    let profile = Profile::load_optional(cli.command.config_path().map(|p| p.as_path()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let interrupt = watch_ctrl_c(cancel.clone());
        let keys = if watch_keys {
            match KeypressWatcher::spawn(cancel.clone()) {
                Ok(watcher) => {
                    info!("Press any key to stop");
                    Some(watcher)
                }
                Err(err) => {
                    warn!("Keyboard stop unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        let job_cancel = cancel.clone();
        let outcome = match cli.command {
            Command::Sweep(args) => {
                let config = args.resolve(&profile);
                tokio::task::spawn_blocking(move || run_sweep(config, job_cancel)).await
            }
            Command::Capture(args) => {
                let config = args.resolve(&profile);
                tokio::task::spawn_blocking(move || run_capture(config, job_cancel)).await
            }
        };

        drop(keys);
        cancel.cancel();
        let _ = interrupt.await;

        let summary = outcome.context("measurement task panicked")??;
        Ok::<_, anyhow::Error>(summary)
    })
}

fn run_sweep(config: SweepConfig, cancel: CancellationToken) -> Result<RunSummary, SweepError> {
    let device = open_reader(&config.reader.uri).map_err(SweepError::device_config("creating reader"))?;
    let store = MeasurementStore::open(&config.database)?;
    SweepController::new(device, store, cancel).run_sweep(&config)
}

fn run_capture(config: CaptureConfig, cancel: CancellationToken) -> Result<RunSummary, SweepError> {
    let device = open_reader(&config.reader.uri).map_err(SweepError::device_config("creating reader"))?;
    let store = MeasurementStore::open(&config.database)?;
    SweepController::new(device, store, cancel).run_capture(&config)
}
