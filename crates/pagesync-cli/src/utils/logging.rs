//! Logging initialization and color control.

use anyhow::Result;
use colored::control as color_control;
use pagesync_core::Verbosity;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Log level for a verbosity setting.
///
/// Per-page and per-asset lines are emitted at `INFO`, so only `Verbose`
/// and above show them.
pub const fn level_for(verbosity: Verbosity) -> Level {
    match verbosity {
        Verbosity::Quiet => Level::ERROR,
        Verbosity::Normal => Level::WARN,
        Verbosity::Verbose => Level::INFO,
        Verbosity::Debug => Level::DEBUG,
    }
}

/// Install the global subscriber writing to stderr.
///
/// # Errors
///
/// Returns an error if the global tracing subscriber cannot be set.
pub fn initialize_logging(verbosity: Verbosity, no_color: bool) -> Result<()> {
    let colors_off = no_color || std::env::var_os("NO_COLOR").is_some();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_for(verbosity))
        .with_target(matches!(verbosity, Verbosity::Debug))
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(!colors_off)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if colors_off {
        color_control::set_override(false);
    }
    Ok(())
}
