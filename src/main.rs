//! memdna CLI
//!
//! Drives the monitoring engine over a recorded sample replay and prints a
//! tracking report.
//!
//! Environment variables (`MEMDNA_*`) override the config file; `RUST_LOG`
//! overrides the configured log level.

use anyhow::Context;
use clap::{Parser, Subcommand};
use memdna::config::{generate_default_config, Config, LoggingConfig};
use memdna::history::EngineSnapshot;
use memdna::monitor::{CsvReplaySource, Monitor, RunOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memdna")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Memory behavior fingerprinting and anomaly detection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor over a CSV replay and print a JSON report
    Run {
        /// CSV of recorded samples
        #[arg(long)]
        replay: PathBuf,
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// Processes listed in the report
        #[arg(long, default_value = "10")]
        top: usize,
        /// Wait one sampling interval between ticks
        #[arg(long)]
        paced: bool,
        /// Restore engine state from a snapshot before running
        #[arg(long)]
        restore: Option<PathBuf>,
        /// Save engine state to a snapshot after running
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Print the default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("memdna={}", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load_default(),
    };
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
        }

        Commands::Run {
            replay,
            ticks,
            top,
            paced,
            restore,
            snapshot,
        } => {
            init_tracing(&config.logging);
            tracing::info!("memdna v{}", env!("CARGO_PKG_VERSION"));

            let source = CsvReplaySource::from_path(&replay)
                .with_context(|| format!("reading replay {}", replay.display()))?;
            let monitor = Arc::new(Monitor::new(&config, Arc::new(source)));

            if let Some(path) = restore {
                let state = EngineSnapshot::load(&path)
                    .with_context(|| format!("loading snapshot {}", path.display()))?;
                monitor.restore(state).await;
            }

            let handle = Arc::clone(&monitor).start(RunOptions {
                max_ticks: ticks,
                paced,
            });

            let stopper = Arc::clone(&monitor);
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, stopping after current tick");
                    stopper.stop();
                }
            });

            let ran = handle.await.context("monitor task failed")?;
            ctrl_c.abort();
            tracing::info!(ticks = ran, "Replay finished");

            if let Some(path) = snapshot {
                monitor
                    .snapshot()
                    .await
                    .save(&path)
                    .with_context(|| format!("saving snapshot {}", path.display()))?;
            }

            let report = monitor.report(top).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
