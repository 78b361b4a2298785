//! Thin CLI shell around the cleanup engine.
//!
//! Exit codes: 0 for a completed run (even with per-item failures; those
//! are reported, not fatal), 1 for a fatal run error (scan or evaluation),
//! 2 for configuration problems. The run report is printed to stdout as a
//! single JSON line; logs go to stderr.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use custodian::{
    cleanup::{self, PolicyMode},
    client::HttpHomeserverClient,
    config::CustodianConfig,
    observability,
};

#[derive(Debug, Parser)]
#[command(
    name = "custodian",
    version,
    about = "Reclaims homeserver storage by retiring stale rooms and media"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "custodian.toml")]
    config: PathBuf,

    /// Simulate the run without deleting anything, overriding the config.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    mode: ModeCommand,
}

#[derive(Debug, Subcommand)]
enum ModeCommand {
    /// Delete content older than the configured age threshold.
    Retention,
    /// Reclaim storage until the configured free-space target is met.
    Pressure,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match CustodianConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("custodian: {error}");
            return ExitCode::from(2);
        }
    };
    if cli.dry_run {
        config.cleanup.dry_run = true;
    }

    if let Err(error) = observability::init_tracing(&config.observability) {
        eprintln!("custodian: {error}");
        return ExitCode::from(2);
    }

    let client = match HttpHomeserverClient::new(&config.homeserver) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            tracing::error!(error = %error, "Failed to build homeserver client");
            return ExitCode::from(2);
        }
    };

    let mode = match cli.mode {
        ModeCommand::Retention => PolicyMode::Retention,
        ModeCommand::Pressure => PolicyMode::Pressure,
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, letting in-flight deletions finish");
            signal_cancel.cancel();
        }
    });

    match cleanup::run_cleanup(mode, &config, client, cancel).await {
        Ok(report) => {
            println!("{}", serde_json::to_string(&report).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(error = %error, "Cleanup run failed");
            ExitCode::FAILURE
        }
    }
}
