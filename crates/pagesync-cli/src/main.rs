//! pagesync CLI - incremental Notion to Hugo content sync.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use pagesync_core::{CancelFlag, SyncConfig};

mod cli;
mod commands;
mod error;
mod utils;

use cli::{Cli, Commands};
use error::ExitStatus;
use utils::logging::initialize_logging;

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so clap's env fallbacks see it
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match SyncConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return ExitStatus::Failure.into();
        },
    };
    if let Some(verbosity) = cli.verbosity_override() {
        config.verbosity = verbosity;
    }

    if let Err(e) = initialize_logging(config.verbosity, cli.no_color) {
        eprintln!("{} failed to initialize logging: {e}", "warning:".yellow());
    }

    let cancel = CancelFlag::new();
    watch_interrupt(cancel.clone());

    match execute(cli, config, cancel).await {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("{} {}: {e:#}", "error:".red().bold(), ExitStatus::describe(&e));
            ExitStatus::from_error(&e).into()
        },
    }
}

async fn execute(cli: Cli, config: SyncConfig, cancel: CancelFlag) -> Result<ExitStatus> {
    match cli.command {
        Commands::Sync(args) => {
            let report = commands::run_sync(&args, config, cancel).await?;
            Ok(if report.cancelled {
                ExitStatus::Interrupted
            } else {
                ExitStatus::Success
            })
        },
        Commands::Check(args) => {
            commands::check_database(&args, config).await?;
            Ok(ExitStatus::Success)
        },
    }
}

/// First Ctrl-C stops scheduling work; a second one exits immediately.
fn watch_interrupt(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{} finishing in-flight downloads, press Ctrl-C again to abort",
            "Interrupted:".yellow().bold()
        );
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(i32::from(ExitStatus::Interrupted.code()));
        }
    });
}
