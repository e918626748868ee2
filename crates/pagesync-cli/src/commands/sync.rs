//! `pagesync sync`: mirror the database into the content tree.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use pagesync_core::{
    CancelFlag, HttpFetcher, NotionClient, SyncConfig, SyncEngine, SyncOptions, SyncReport,
    Verbosity,
};

use crate::cli::SyncArgs;
use crate::utils::progress;

/// Run one sync and print its summary.
///
/// Page and asset failures are part of the returned report; only fatal
/// errors come back as `Err`.
pub async fn execute(
    args: &SyncArgs,
    mut config: SyncConfig,
    cancel: CancelFlag,
) -> Result<SyncReport> {
    args.apply(&mut config);
    config.validate_source()?;
    let verbosity = config.verbosity;

    let source = Arc::new(NotionClient::from_env(&config)?);
    let fetcher = Arc::new(HttpFetcher::new(&config.download)?);

    let pb = progress::page_bar(verbosity);
    let bar = pb.clone();
    let mut engine = SyncEngine::new(config, source, fetcher, cancel)?
        .with_progress(move |done, total, title| progress::advance(&bar, done, total, title));

    let result = engine.run(SyncOptions { clean: args.clean }).await;
    pb.finish_and_clear();
    let report = result?;

    print_summary(&report, verbosity);
    Ok(report)
}

fn print_summary(report: &SyncReport, verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet {
        return;
    }
    let marker = if report.cancelled {
        "Interrupted".yellow().bold()
    } else if report.is_degraded() {
        "Done with warnings".yellow().bold()
    } else {
        "Done".green().bold()
    };
    println!("{marker}: {report}");
    if report.conversion_warnings > 0 {
        println!(
            "  {} block(s) used the plain-text fallback",
            report.conversion_warnings
        );
    }
}
