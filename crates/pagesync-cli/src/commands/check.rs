//! `pagesync check`: verify token, database access and schema.
//!
//! ```bash
//! pagesync check
//! pagesync check --database-id 0123abcd
//! ```

use anyhow::Result;
use colored::Colorize;
use pagesync_core::{NotionClient, SyncConfig};

use crate::cli::CheckArgs;

/// Query the configured database and print what was found.
///
/// Schema problems are printed as warnings and do not fail the command.
pub async fn execute(args: &CheckArgs, mut config: SyncConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate_source()?;

    let client = NotionClient::from_env(&config)?;
    let report = client.check_database().await?;

    println!("{} {}", "Connected to database:".green().bold(), report.title);
    println!("Properties:");
    for (name, kind) in &report.properties {
        println!("  - {name}: {}", kind.dimmed());
    }
    for warning in &report.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }
    let more = if report.has_more { " (more available)" } else { "" };
    println!("Query OK: {} page(s) sampled{more}", report.sample_count);
    Ok(())
}
