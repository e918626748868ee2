//! Sync orchestrator.
//!
//! One run walks the state machine
//!
//! ```text
//! Start -> Listing -> PerPage(Lookup -> Skip | Convert -> Download -> Write -> CacheUpdate) -> Flush -> Done
//! ```
//!
//! Pages are processed sequentially in listing order. Only the asset fetches
//! of the page being processed run concurrently, and the engine awaits the
//! whole batch before the document is rendered, so a page is never recorded
//! as synced while one of its assets is still in flight.
//!
//! Failure handling follows the error classes:
//!
//! - listing failures abort before any page is touched;
//! - a page whose blocks cannot be fetched is counted as failed and skipped;
//! - asset failures degrade to a cached copy or the remote URL;
//! - document writes and the cache flush are fatal.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, SyncCache};
use crate::cancel::CancelFlag;
use crate::config::{SyncConfig, Verbosity};
use crate::convert::Converter;
use crate::download::{AssetFetcher, DownloadBatch, Downloader};
use crate::source::{ContentSource, collect_pages, fetch_block_tree};
use crate::storage::write_atomic;
use crate::types::{ContentIdentity, PageRecord};
use crate::{Error, Result};

/// Page progress callback: `(processed, total, title)`.
pub type PageProgress = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Options for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Remove previous output first and rewrite every page.
    pub clean: bool,
}

/// Current stage of a run, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Preparing output and cache.
    Start,
    /// Reading the page listing.
    Listing,
    /// Processing pages one by one.
    Pages,
    /// Pruning and persisting the cache.
    Flush,
    /// Run finished.
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Listing => "listing",
            Self::Pages => "pages",
            Self::Flush => "flush",
            Self::Done => "done",
        })
    }
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Cached identity matched; nothing was done.
    Skipped,
    /// Document written.
    Written {
        /// Document path.
        path: PathBuf,
        /// At least one asset fell back to a cached copy or remote URL.
        degraded: bool,
    },
    /// The page could not be produced this run.
    Failed {
        /// Error message.
        reason: String,
    },
    /// Interrupted before its document was written.
    Abandoned,
}

/// Counters for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pages in the listing that were eligible for sync.
    pub pages_listed: usize,
    /// Documents written.
    pub pages_written: usize,
    /// Pages skipped because their identity was unchanged.
    pub pages_skipped: usize,
    /// Pages that could not be produced.
    pub pages_failed: usize,
    /// Pages written with nested blocks missing.
    pub pages_partial: usize,
    /// Documents removed because their page left the listing.
    pub pages_pruned: usize,
    /// Assets fetched.
    pub assets_downloaded: usize,
    /// Assets served from an existing local copy.
    pub assets_reused: usize,
    /// Assets that fell back to a cached copy or the remote URL.
    pub assets_failed: usize,
    /// Blocks rendered through the fallback path.
    pub conversion_warnings: usize,
    /// The run stopped early on request.
    pub cancelled: bool,
}

impl SyncReport {
    /// Whether any page or asset degraded.
    pub const fn is_degraded(&self) -> bool {
        self.pages_failed > 0 || self.pages_partial > 0 || self.assets_failed > 0
    }

    fn absorb(&mut self, batch: &DownloadBatch) {
        self.assets_downloaded += batch.fetched;
        self.assets_reused += batch.reused;
        self.assets_failed += batch.failed;
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages: {} written, {} unchanged, {} failed, {} pruned; assets: {} downloaded, {} reused, {} failed",
            self.pages_listed,
            self.pages_written,
            self.pages_skipped,
            self.pages_failed,
            self.pages_pruned,
            self.assets_downloaded,
            self.assets_reused,
            self.assets_failed,
        )?;
        if self.pages_partial > 0 {
            write!(f, "; {} page(s) missing nested blocks", self.pages_partial)?;
        }
        if self.cancelled {
            f.write_str(" (interrupted)")?;
        }
        Ok(())
    }
}

/// Drives one source into the output tree.
pub struct SyncEngine {
    config: SyncConfig,
    source: Arc<dyn ContentSource>,
    downloader: Downloader,
    converter: Converter,
    cache: SyncCache,
    cancel: CancelFlag,
    progress: Option<PageProgress>,
}

impl SyncEngine {
    /// Engine with the cache loaded from `config.paths.cache_file`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the cache file exists but is unreadable,
    /// corrupt, or from a newer version.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn ContentSource>,
        fetcher: Arc<dyn AssetFetcher>,
        cancel: CancelFlag,
    ) -> Result<Self> {
        let cache = SyncCache::load(&config.paths.cache_file)?;
        let downloader = Downloader::new(fetcher, &config, cancel.clone());
        let converter = Converter::new().with_front_matter(config.output.front_matter);
        Ok(Self {
            config,
            source,
            downloader,
            converter,
            cache,
            cancel,
            progress: None,
        })
    }

    /// Report page progress after each page.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Report asset progress within each page's download batch.
    #[must_use]
    pub fn with_asset_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.downloader = self.downloader.with_progress(callback);
        self
    }

    /// The change-detection cache as of the last step.
    pub const fn cache(&self) -> &SyncCache {
        &self.cache
    }

    /// Document path for a page slug.
    pub fn document_path(&self, page: &PageRecord) -> PathBuf {
        self.config
            .paths
            .posts_dir()
            .join(format!("{}.md", file_stem(page)))
    }

    /// Execute one run.
    ///
    /// # Errors
    ///
    /// Listing failures, unwritable output and cache flush failures abort
    /// the run. Individual page and asset failures are reported in the
    /// returned [`SyncReport`] instead.
    pub async fn run(&mut self, options: SyncOptions) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let verbosity = self.config.verbosity;

        enter(SyncPhase::Start);
        if options.clean {
            self.clean_output()?;
        }
        self.cache.retain_existing(&self.config.paths.static_dir);

        enter(SyncPhase::Listing);
        let pages = collect_pages(self.source.as_ref()).await.map_err(|e| {
            warn!(error = %e, category = e.category(), "Listing failed");
            e
        })?;
        let listed_ids: HashSet<String> = pages.iter().map(|p| p.id.clone()).collect();
        let pages: Vec<PageRecord> = pages
            .into_iter()
            .filter(|page| {
                let keep = page.meta.published || self.config.output.include_drafts;
                if !keep {
                    debug!(page_id = %page.id, "Skipping unpublished page");
                }
                keep
            })
            .collect();
        report.pages_listed = pages.len();
        info!(pages = pages.len(), "Listed pages");

        enter(SyncPhase::Pages);
        // document path -> id of the listed page that owns it this run
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();
        let total = pages.len();
        for (index, page) in pages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = total - index, "Interrupted, not scheduling further pages");
                report.cancelled = true;
                break;
            }

            let path = self.document_path(page);
            let shared = match claimed.insert(path.clone(), page.id.clone()) {
                Some(earlier) => {
                    warn!(page_id = %page.id, earlier = %earlier, path = %path.display(), "Duplicate slug, later page overwrites earlier");
                    self.cache.remove(&CacheKey::page(earlier.as_str()));
                    true
                },
                None => false,
            };
            let options = SyncOptions {
                clean: options.clean || shared,
            };

            match self.sync_page(page, &path, options, &mut report).await? {
                PageOutcome::Skipped => {
                    report.pages_skipped += 1;
                    log_item(verbosity, &page.meta.title, "unchanged");
                },
                PageOutcome::Written { degraded, .. } => {
                    report.pages_written += 1;
                    log_item(
                        verbosity,
                        &page.meta.title,
                        if degraded { "written (degraded)" } else { "written" },
                    );
                },
                PageOutcome::Failed { reason } => {
                    report.pages_failed += 1;
                    warn!(page_id = %page.id, title = %page.meta.title, error = %reason, "Page failed");
                },
                PageOutcome::Abandoned => {
                    report.cancelled = true;
                    break;
                },
            }

            if let Some(progress) = &self.progress {
                progress(index + 1, total, &page.meta.title);
            }
        }

        enter(SyncPhase::Flush);
        if !report.cancelled {
            if self.config.output.prune_removed {
                report.pages_pruned = self.prune(&listed_ids, &claimed);
            }
            self.cache.mark_synced(Utc::now());
        }
        self.cache.flush()?;

        enter(SyncPhase::Done);
        info!(
            written = report.pages_written,
            skipped = report.pages_skipped,
            failed = report.pages_failed,
            pruned = report.pages_pruned,
            assets_downloaded = report.assets_downloaded,
            assets_failed = report.assets_failed,
            cancelled = report.cancelled,
            "Sync finished"
        );
        Ok(report)
    }

    /// Lookup, convert, download, write and record one page.
    async fn sync_page(
        &mut self,
        page: &PageRecord,
        path: &Path,
        options: SyncOptions,
        report: &mut SyncReport,
    ) -> Result<PageOutcome> {
        let key = CacheKey::page(page.id.as_str());

        if let Some(identity) = page.listed_identity() {
            if !options.clean && self.is_current(&key, &identity, path) {
                return Ok(PageOutcome::Skipped);
            }
        }

        let tree = match fetch_block_tree(self.source.as_ref(), &page.id).await {
            Ok(tree) => tree,
            Err(e) => {
                return Ok(PageOutcome::Failed {
                    reason: e.to_string(),
                });
            },
        };

        let identity = match page.listed_identity() {
            Some(identity) => identity,
            None => {
                let hashed = ContentIdentity::from_blocks(&tree.blocks);
                if !options.clean && self.is_current(&key, &hashed, path) {
                    return Ok(PageOutcome::Skipped);
                }
                hashed
            },
        };

        let document = self.converter.convert_page(page, &tree.blocks);
        report.conversion_warnings += document.warnings().len();

        let assets = document.assets();
        let batch = self.downloader.download(&assets, &self.cache).await;
        report.absorb(&batch);
        for (asset_key, asset_path, asset_identity) in batch.downloaded() {
            self.cache.put(
                CacheKey::asset(asset_key),
                CacheEntry::new(asset_identity.clone(), asset_path),
            );
        }

        if self.cancel.is_cancelled() {
            debug!(page_id = %page.id, "Interrupted before write, leaving page for next run");
            return Ok(PageOutcome::Abandoned);
        }

        let text = match document.render(|asset| batch.resolve(asset)) {
            Ok(text) => text,
            Err(e) => {
                return Ok(PageOutcome::Failed {
                    reason: e.to_string(),
                });
            },
        };
        write_atomic(path, text.as_bytes())?;

        // a page with fallback links or missing subtrees is rewritten next run
        // instead of being pinned
        if !tree.is_complete() {
            report.pages_partial += 1;
        }
        let degraded = batch.has_failures() || !tree.is_complete();
        if degraded {
            self.cache.remove(&key);
        } else {
            self.cache.put(key, CacheEntry::new(identity, path));
        }
        Ok(PageOutcome::Written {
            path: path.to_path_buf(),
            degraded,
        })
    }

    fn is_current(&self, key: &CacheKey, identity: &ContentIdentity, path: &Path) -> bool {
        self.cache.get(key).is_some_and(|entry| {
            entry.identity == *identity && entry.path == path && path.is_file()
        })
    }

    /// Remove the posts section before a full rewrite.
    fn clean_output(&self) -> Result<()> {
        let posts = self.config.paths.posts_dir();
        if posts.exists() {
            info!(path = %posts.display(), "Cleaning previous output");
            std::fs::remove_dir_all(&posts).map_err(|e| {
                Error::Storage(format!("Failed to clean {}: {e}", posts.display()))
            })?;
        }
        Ok(())
    }

    /// Drop documents for pages that left the listing.
    ///
    /// A document still owned by a listed page (a shared slug) keeps its
    /// file; only the stale cache entry goes.
    fn prune(&mut self, listed: &HashSet<String>, claimed: &HashMap<PathBuf, String>) -> usize {
        let stale: Vec<String> = self
            .cache
            .page_ids()
            .filter(|id| !listed.contains(*id))
            .map(str::to_string)
            .collect();

        let mut pruned = 0;
        for id in stale {
            let Some(entry) = self.cache.remove(&CacheKey::page(id.as_str())) else {
                continue;
            };
            if let Some(owner) = claimed.get(&entry.path) {
                debug!(page_id = %id, owner = %owner, path = %entry.path.display(), "Stale entry shares a live document, keeping file");
                continue;
            }
            if entry.path.is_file() {
                match std::fs::remove_file(&entry.path) {
                    Ok(()) => {
                        pruned += 1;
                        info!(page_id = %id, path = %entry.path.display(), "Removed stale document");
                    },
                    Err(e) => {
                        warn!(page_id = %id, path = %entry.path.display(), error = %e, "Failed to remove stale document");
                    },
                }
            }
        }
        pruned
    }
}

fn enter(phase: SyncPhase) {
    debug!(%phase, "Sync phase");
}

fn log_item(verbosity: Verbosity, title: &str, status: &str) {
    if verbosity.reports_items() {
        info!(title, status, "Page");
    } else {
        debug!(title, status, "Page");
    }
}

/// File stem for a page: its slug with path-hostile characters replaced.
fn file_stem(page: &PageRecord) -> String {
    let cleaned: String = page
        .meta
        .slug
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(['.', '-']).to_string();
    if cleaned.is_empty() {
        PageRecord::default_slug(&page.id)
    } else {
        cleaned
    }
}
