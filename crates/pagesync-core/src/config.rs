//! Configuration for a sync run.
//!
//! Configuration is stored in TOML and resolved once at startup:
//!
//! 1. Built-in defaults ([`SyncConfig::default`])
//! 2. A config file: an explicit path, else `pagesync.toml` in the working
//!    directory, else the platform config directory
//! 3. Overrides applied by the caller (CLI flags)
//!
//! The resulting [`SyncConfig`] is passed by reference into every component
//! constructor. Nothing in the crate reads configuration from the
//! environment on its own, including log verbosity.
//!
//! ## Example Configuration File
//!
//! ```toml
//! verbosity = "normal"
//!
//! [paths]
//! content_dir = "content"
//! posts_section = "posts"
//! static_dir = "static"
//! cache_file = ".pagesync-cache.json"
//!
//! [download]
//! concurrency = 5
//! timeout_secs = 30
//! optimize_images = true
//! max_image_width = 1920
//! jpeg_quality = 85
//!
//! [output]
//! front_matter = "yaml"
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! backoff_multiplier = 2.0
//!
//! [source]
//! database_id = "0123456789abcdef0123456789abcdef"
//! token_env = "NOTION_TOKEN"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// File name looked up in the working directory when no explicit path is given.
pub const LOCAL_CONFIG_FILE: &str = "pagesync.toml";

/// Top-level configuration for the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Output and cache locations.
    pub paths: PathsConfig,
    /// Media downloader settings.
    pub download: DownloadConfig,
    /// Retry policy shared by asset fetches and source requests.
    pub retry: RetryConfig,
    /// Remote content source settings.
    pub source: SourceConfig,
    /// Output document behaviour.
    pub output: OutputConfig,
    /// How chatty the run should be.
    pub verbosity: Verbosity,
}

/// Log verbosity, chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Run summary and warnings.
    #[default]
    Normal,
    /// Per-page and per-asset progress.
    Verbose,
    /// Everything, including retry bookkeeping.
    Debug,
}

impl Verbosity {
    /// Whether per-item progress lines should be emitted at `info` level.
    pub const fn reports_items(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }
}

/// Output tree and cache locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the site content tree.
    pub content_dir: PathBuf,
    /// Section under `content_dir` that receives one document per page.
    pub posts_section: String,
    /// Root of the static asset tree (`images/`, `videos/`, ...).
    pub static_dir: PathBuf,
    /// Change-detection cache file.
    pub cache_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            posts_section: "posts".to_string(),
            static_dir: PathBuf::from("static"),
            cache_file: PathBuf::from(".pagesync-cache.json"),
        }
    }
}

impl PathsConfig {
    /// Directory holding the generated page documents.
    #[must_use]
    pub fn posts_dir(&self) -> PathBuf {
        self.content_dir.join(&self.posts_section)
    }
}

/// Media downloader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum simultaneous in-flight fetches.
    pub concurrency: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header for asset and API requests.
    pub user_agent: String,
    /// Re-encode downloaded images as JPEG, flattened and width-capped.
    pub optimize_images: bool,
    /// Images wider than this are scaled down, keeping the aspect ratio.
    pub max_image_width: u32,
    /// JPEG quality for re-encoded images, `1..=100`.
    pub jpeg_quality: u8,
}

impl DownloadConfig {
    /// Upper bound on the worker pool size.
    pub const MAX_CONCURRENCY: usize = 32;

    /// Concurrency clamped to `1..=MAX_CONCURRENCY`.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, Self::MAX_CONCURRENCY)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout_secs: 30,
            user_agent: concat!("pagesync/", env!("CARGO_PKG_VERSION")).to_string(),
            optimize_images: true,
            max_image_width: 1920,
            jpeg_quality: 85,
        }
    }
}

/// Retry policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor applied to each subsequent delay.
    pub backoff_multiplier: f64,
    /// Upper bound of random delay added to each backoff, in milliseconds.
    pub jitter_ms: u64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_ms: 0,
            max_delay_ms: 60_000,
        }
    }
}

/// Remote content source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Database whose pages are mirrored.
    pub database_id: String,
    /// API root URL.
    pub api_base: String,
    /// Value sent in the `Notion-Version` header.
    pub api_version: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    /// Page size for paginated listing requests.
    pub page_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            database_id: String::new(),
            api_base: "https://api.notion.com/v1".to_string(),
            api_version: "2022-06-28".to_string(),
            token_env: "NOTION_TOKEN".to_string(),
            page_size: 100,
        }
    }
}

/// Header syntax at the top of each document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontMatterFormat {
    /// YAML between `---` fences.
    #[default]
    Yaml,
    /// TOML between `+++` fences.
    Toml,
}

/// Output document behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Also mirror unpublished pages, marked as drafts.
    pub include_drafts: bool,
    /// Remove documents whose page disappeared from the listing.
    pub prune_removed: bool,
    /// Header syntax.
    pub front_matter: FrontMatterFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            include_drafts: false,
            prune_removed: true,
            front_matter: FrontMatterFormat::Yaml,
        }
    }
}

impl SyncConfig {
    /// Load configuration, falling back to defaults when no file exists.
    ///
    /// An explicit `path` must exist. Without one, `pagesync.toml` in the
    /// working directory is tried, then the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a file exists but cannot be read or
    /// contains invalid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load_from(&local);
        }

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                return Self::load_from(&global);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Platform config location (`~/.config/pagesync/config.toml` on Linux).
    #[must_use]
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "pagesync", "pagesync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.download.concurrency == 0 {
            return Err(Error::Config(
                "download.concurrency must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.download.jpeg_quality) {
            return Err(Error::Config(
                "download.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        if self.download.max_image_width == 0 {
            return Err(Error::Config(
                "download.max_image_width must be at least 1".to_string(),
            ));
        }
        if self.paths.posts_section.trim().is_empty()
            || self.paths.posts_section.contains(['/', '\\'])
            || self.paths.posts_section.contains("..")
        {
            return Err(Error::Config(format!(
                "paths.posts_section must be a single directory name, got '{}'",
                self.paths.posts_section
            )));
        }
        Ok(())
    }

    /// Validation for commands that talk to the content source.
    pub fn validate_source(&self) -> Result<()> {
        self.validate()?;
        if self.source.database_id.trim().is_empty() {
            return Err(Error::Config(
                "source.database_id is required (set it in the config file or pass --database-id)"
                    .to_string(),
            ));
        }
        url::Url::parse(&self.source.api_base).map_err(|e| {
            Error::Config(format!("source.api_base is not a valid URL: {e}"))
        })?;
        Ok(())
    }
}
