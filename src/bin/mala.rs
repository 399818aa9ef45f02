//! Mala CLI binary.

use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::info;

use mala::cli::Cli;
use mala::config::{DbSettings, RunConfig};
use mala::core::MalaError;
use mala::db::{setup, RetryPolicy};
use mala::pipeline;

fn main() -> Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("mala.log")
        .context("Failed to open mala.log")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::DEBUG.into()),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = cli.into_run_config()?;
    let settings = DbSettings::from_env()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    match rt.block_on(ingest(config, settings)) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Empty work set is a clean, already-printed exit.
            if matches!(e.downcast_ref::<MalaError>(), Some(MalaError::NoFiles)) {
                std::process::exit(1);
            }
            Err(e)
        }
    }
}

async fn ingest(config: RunConfig, settings: DbSettings) -> Result<()> {
    setup::ensure_schema(&settings)
        .await
        .context("Schema bootstrap failed")?;

    info!("Starting mala with command \"{}\"", config.cmdline);
    let start = Instant::now();
    let stats = pipeline::run(config, settings, RetryPolicy::default()).await?;
    let runtime = start.elapsed().as_secs_f64();

    println!(
        "Handled {} malware samples in {:.3} seconds.",
        stats.files.to_string().cyan().bold(),
        runtime
    );
    println!(
        "Processing speed: {:.3} samples per second.",
        stats.files as f64 / runtime.max(f64::EPSILON)
    );

    if stats.workers_failed > 0 {
        anyhow::bail!(MalaError::WorkersFailed {
            failed: stats.workers_failed,
            spawned: stats.workers_spawned,
        });
    }
    Ok(())
}
