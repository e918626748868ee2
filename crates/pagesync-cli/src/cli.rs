//! # CLI Structure and Argument Parsing
//!
//! The `pagesync` command follows a command-subcommand pattern:
//!
//! - **Global options**: config file, verbosity and color flags
//! - **Subcommands**: `sync` mirrors the database, `check` verifies access
//!
//! ```bash
//! # Incremental sync using pagesync.toml in the working directory
//! pagesync sync
//!
//! # Full rewrite of every page
//! pagesync sync --clean
//!
//! # Verify token, database access and schema
//! pagesync check --database-id 0123abcd
//! ```
//!
//! Flags override the configuration file, which overrides built-in defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pagesync_core::{SyncConfig, Verbosity};

/// Main CLI structure for the `pagesync` command.
#[derive(Parser, Clone, Debug)]
#[command(name = "pagesync")]
#[command(version)]
#[command(about = "pagesync - incremental Notion to Hugo content sync", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./pagesync.toml, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report every page and asset
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Full diagnostic logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only show errors
    #[arg(short = 'q', long, global = true, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Disable colored output (also honors `NO_COLOR`)
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Verbosity requested on the command line, if any flag was given.
    pub const fn verbosity_override(&self) -> Option<Verbosity> {
        if self.debug {
            Some(Verbosity::Debug)
        } else if self.verbose {
            Some(Verbosity::Verbose)
        } else if self.quiet {
            Some(Verbosity::Quiet)
        } else {
            None
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Mirror published pages into the content directory
    Sync(SyncArgs),
    /// Verify the token, database access and required properties
    Check(CheckArgs),
}

/// Arguments for `pagesync sync`.
#[derive(Args, Clone, Debug, Default)]
pub struct SyncArgs {
    /// Remove previously generated posts and rewrite every page
    #[arg(long)]
    pub clean: bool,

    /// Notion database id
    #[arg(long, env = "NOTION_DATABASE_ID", value_name = "ID")]
    pub database_id: Option<String>,

    /// Site content directory
    #[arg(long, value_name = "DIR")]
    pub content_dir: Option<PathBuf>,

    /// Site static directory
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Maximum simultaneous asset downloads
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Also write unpublished pages as drafts
    #[arg(long)]
    pub include_drafts: bool,
}

impl SyncArgs {
    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut SyncConfig) {
        if let Some(id) = &self.database_id {
            config.source.database_id.clone_from(id);
        }
        if let Some(dir) = &self.content_dir {
            config.paths.content_dir.clone_from(dir);
        }
        if let Some(dir) = &self.static_dir {
            config.paths.static_dir.clone_from(dir);
        }
        if let Some(n) = self.concurrency {
            config.download.concurrency = n;
        }
        if self.include_drafts {
            config.output.include_drafts = true;
        }
    }
}

/// Arguments for `pagesync check`.
#[derive(Args, Clone, Debug, Default)]
pub struct CheckArgs {
    /// Notion database id
    #[arg(long, env = "NOTION_DATABASE_ID", value_name = "ID")]
    pub database_id: Option<String>,
}

impl CheckArgs {
    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut SyncConfig) {
        if let Some(id) = &self.database_id {
            config.source.database_id.clone_from(id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pagesync",
            "sync",
            "--clean",
            "--database-id",
            "db-9",
            "--content-dir",
            "site/content",
            "--concurrency",
            "8",
            "--include-drafts",
        ])
        .unwrap();
        let Commands::Sync(args) = cli.command else {
            unreachable!("parsed sync");
        };
        assert!(args.clean);

        let mut config = SyncConfig::default();
        args.apply(&mut config);
        assert_eq!(config.source.database_id, "db-9");
        assert_eq!(config.paths.content_dir, PathBuf::from("site/content"));
        assert_eq!(config.download.concurrency, 8);
        assert!(config.output.include_drafts);
        assert_eq!(config.paths.static_dir, PathBuf::from("static"));
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::try_parse_from(["pagesync", "-v", "check"]).unwrap();
        assert_eq!(cli.verbosity_override(), Some(Verbosity::Verbose));

        let cli = Cli::try_parse_from(["pagesync", "check"]).unwrap();
        assert_eq!(cli.verbosity_override(), None);

        assert!(Cli::try_parse_from(["pagesync", "-q", "-v", "check"]).is_err());
    }
}
