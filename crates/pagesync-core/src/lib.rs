//! # pagesync-core
//!
//! Incremental sync engine that mirrors a remote block-structured page
//! collection (a Notion database) into static-site content: one Markdown
//! document per page plus a local asset store for its media.
//!
//! ## Architecture
//!
//! - **Source**: paginated page listing and block-children reads behind the
//!   [`ContentSource`] trait, with a Notion HTTP implementation
//! - **Converter**: deterministic block tree to Markdown conversion with
//!   asset placeholders and a plain-text fallback for unknown block types
//! - **Downloader**: bounded-concurrency media fetches with in-run dedup,
//!   retries, image re-encoding and atomic writes
//! - **Cache**: versioned on-disk map of page and asset identities
//! - **Engine**: the sequential per-page state machine tying it together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagesync_core::{
//!     CancelFlag, HttpFetcher, NotionClient, SyncConfig, SyncEngine, SyncOptions,
//! };
//!
//! # async fn example() -> pagesync_core::Result<()> {
//! let config = SyncConfig::load(None)?;
//! config.validate_source()?;
//!
//! let source = Arc::new(NotionClient::from_env(&config)?);
//! let fetcher = Arc::new(HttpFetcher::new(&config.download)?);
//! let mut engine = SyncEngine::new(config, source, fetcher, CancelFlag::new())?;
//!
//! let report = engine.run(SyncOptions::default()).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`Result<T, Error>`]. [`Error::class`] places an
//! error in the run-level taxonomy:
//!
//! ```rust
//! use pagesync_core::{Error, ErrorClass};
//!
//! let err = Error::RateLimited { retry_after: None };
//! assert!(err.is_recoverable());
//! assert_eq!(err.class(), ErrorClass::Transient);
//!
//! let err = Error::Storage("disk full".into());
//! assert_eq!(err.class(), ErrorClass::FatalLocal);
//! ```

/// Asset references and local path planning
pub mod asset;
/// Typed content-block tree
pub mod block;
/// Change-detection cache
pub mod cache;
/// Cooperative cancellation
pub mod cancel;
/// Configuration loading and validation
pub mod config;
/// Block tree to Markdown conversion
pub mod convert;
/// Bounded-concurrency media downloader
pub mod download;
/// Error types and result aliases
pub mod error;
/// Shared HTTP client and status mapping
pub mod http;
/// Image re-encoding for downloads
pub mod optimize;
/// Retry policy with exponential backoff
pub mod retry;
/// Remote content sources
pub mod source;
/// Atomic file writes
pub mod storage;
/// Sync orchestrator
pub mod sync;
/// Page records and content identity
pub mod types;

// Re-export commonly used types
pub use asset::AssetRef;
pub use block::{Block, BlockKind, MediaKind, MediaSource, RichText};
pub use cache::{CacheEntry, CacheKey, SyncCache};
pub use cancel::CancelFlag;
pub use config::{
    DownloadConfig, FrontMatterFormat, OutputConfig, PathsConfig, RetryConfig, SourceConfig,
    SyncConfig, Verbosity,
};
pub use convert::{Converter, PageDocument};
pub use download::{AssetFetcher, AssetOutcome, Downloader, HttpFetcher};
pub use error::{Error, ErrorClass, Result};
pub use optimize::ImageOptimizer;
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use source::{ContentSource, DatabaseReport, NotionClient};
pub use sync::{SyncEngine, SyncOptions, SyncReport};
pub use types::{ContentIdentity, PageMeta, PageRecord};
