//! pvsave Binary Entry Point
//!
//! Runs the save/restore engine against a simulated channel source, validates
//! configuration files and inspects stores. Core functionality is provided by
//! the `pvsave` library crate.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pvsave::{
    AppConfig, MemoryChannelSource, PvSave,
    backend::{FileFormat, diff_records, load_snapshot, text::TextWriter},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter.
const DEFAULT_FILTER: &str = "info,pvsave=debug";

/// pvsave - Channel Save/Restore
#[derive(Parser, Debug)]
#[command(name = "pvsave", version, about, long_about = None)]
struct Cli {
    /// Log filter (overrides RUST_LOG and the config file)
    #[arg(long, global = true, env = "PVSAVE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore, then save periodically until Ctrl+C / SIGTERM
    Run {
        /// Path to configuration file
        #[arg(
            short,
            long,
            default_value = "configs/pvsave.yaml",
            env = "PVSAVE_CONFIG"
        )]
        config: PathBuf,
    },
    /// Load and validate a configuration file, then print the registry
    Check {
        /// Path to configuration file
        #[arg(
            short,
            long,
            default_value = "configs/pvsave.yaml",
            env = "PVSAVE_CONFIG"
        )]
        config: PathBuf,
    },
    /// Print the records of a store, sorted by name
    Dump {
        /// Store file
        path: PathBuf,

        /// Store format
        #[arg(short, long, default_value_t = FileFormat::Text)]
        format: FileFormat,
    },
    /// Report reference records that differ in or are missing from a candidate
    Compare {
        /// Reference store
        reference: PathBuf,

        /// Candidate store
        candidate: PathBuf,

        /// Format of both stores
        #[arg(short, long, default_value_t = FileFormat::Text)]
        format: FileFormat,
    },
}

fn init_tracing(cli_level: Option<&str>, config_level: Option<&str>) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config_level.unwrap_or(DEFAULT_FILTER))),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = AppConfig::load(&config)?;
            init_tracing(cli.log_level.as_deref(), config.log_level.as_deref());
            run(config).await
        }
        Command::Check { config: path } => {
            let config = AppConfig::load(&path)?;
            init_tracing(cli.log_level.as_deref(), config.log_level.as_deref());
            let registry = config.build_registry()?;
            tracing::info!(path = %path.display(), "Configuration is valid");
            registry.report(&mut io::stdout().lock())?;
            Ok(())
        }
        Command::Dump { path, format } => {
            init_tracing(cli.log_level.as_deref(), None);
            let records: BTreeMap<_, _> = load_snapshot(&path, format)?.into_iter().collect();
            let mut out = TextWriter::new(io::stdout().lock());
            for (name, value) in &records {
                out.write_record(name, value)?;
            }
            out.finish()?;
            Ok(())
        }
        Command::Compare {
            reference,
            candidate,
            format,
        } => {
            init_tracing(cli.log_level.as_deref(), None);
            let expected = load_snapshot(&reference, format)?;
            let actual = load_snapshot(&candidate, format)?;
            let diffs = diff_records(&expected, &actual);

            let mut out = io::stdout().lock();
            for diff in &diffs {
                writeln!(out, "{diff}")?;
            }
            out.flush()?;
            if !diffs.is_empty() {
                tracing::warn!(differences = diffs.len(), "Stores differ");
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("pvsave - Channel Save/Restore");

    let registry = config.build_registry()?;
    let source = Arc::new(MemoryChannelSource::with_channels(
        config.simulated_channels()?,
    ));
    tracing::info!(channels = source.names().len(), "Simulated channel source ready");

    let mut pvsave =
        PvSave::new(registry, source).with_thread_name(config.scheduler.thread_name.clone());

    for outcome in pvsave.run_all_stages()? {
        tracing::info!(
            monitor_set = %outcome.monitor_set,
            backend = outcome.backend.as_deref().unwrap_or("none"),
            restored = outcome.restored,
            status = %outcome.status,
            "Monitor set restored"
        );
    }

    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal().await;

    tracing::info!("Shutting down scheduler...");
    pvsave.shutdown()?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
