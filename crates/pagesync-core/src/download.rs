//! Bounded-concurrency media downloader.
//!
//! The [`Downloader`] receives the assets a converted page references and
//! settles each unique one exactly once per run:
//!
//! 1. An asset already settled earlier in the run reuses that outcome.
//! 2. An asset with a local copy on disk (via the cache or its planned
//!    path) is reused without a fetch.
//! 3. Everything else becomes a [`DownloadTask`], fetched through an
//!    [`AssetFetcher`] under the [`RetryPolicy`] and written atomically.
//!    Images pass through the [`ImageOptimizer`] first when one is set.
//!
//! Tasks run on a pool of at most `concurrency` in-flight fetches; completion
//! order is unspecified. A task that exhausts its retries is
//! [`AssetOutcome::Failed`] and never aborts the run: the document falls back
//! to a previously cached copy or to the remote URL.
//!
//! The downloader only reads the cache. New entries are reported back through
//! [`DownloadBatch::downloaded`] for the engine to record.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::asset::AssetRef;
use crate::block::MediaKind;
use crate::cache::{CacheKey, SyncCache};
use crate::cancel::CancelFlag;
use crate::config::{DownloadConfig, SyncConfig, Verbosity};
use crate::http::{build_client, status_error};
use crate::optimize::ImageOptimizer;
use crate::retry::{Retried, RetryPolicy};
use crate::storage::write_atomic_async;
use crate::types::ContentIdentity;
use crate::{Error, Result};

/// Progress callback, called with `(completed, total)` after each task.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Source of asset bytes.
#[async_trait::async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the full body at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`AssetFetcher`] over HTTP.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Fetcher with timeout and user agent from `config`.
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
        })
    }

    /// Fetcher sharing an existing client.
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response.headers(), url, None));
        }
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// One unique asset scheduled for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// What to fetch.
    pub asset: AssetRef,
    /// Absolute destination path.
    pub destination: PathBuf,
}

/// How an asset was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Fetched and written this run.
    Downloaded {
        /// Path relative to the static root.
        path: PathBuf,
        /// Digest of the written bytes.
        identity: ContentIdentity,
        /// Attempts it took.
        attempts: u32,
    },
    /// An existing local copy was used.
    Reused {
        /// Path relative to the static root.
        path: PathBuf,
    },
    /// Could not be fetched.
    Failed {
        /// Final error message.
        reason: String,
        /// Previously cached local copy, if one still exists.
        fallback: Option<PathBuf>,
    },
}

impl AssetOutcome {
    /// Location documents should reference for `asset`.
    pub fn location(&self, asset: &AssetRef) -> String {
        match self {
            Self::Downloaded { path, .. }
            | Self::Reused { path }
            | Self::Failed {
                fallback: Some(path),
                ..
            } => public_path(path),
            Self::Failed { fallback: None, .. } => asset.url.clone(),
        }
    }

    /// Whether the asset ended up without a fresh or reused local copy.
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// `images/a.png` becomes `/images/a.png` regardless of platform separator.
fn public_path(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            out.push('/');
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

/// Outcomes of one [`Downloader::download`] call.
#[derive(Debug, Default)]
pub struct DownloadBatch {
    outcomes: HashMap<String, AssetOutcome>,
    /// Assets fetched in this batch.
    pub fetched: usize,
    /// Assets reused from disk in this batch.
    pub reused: usize,
    /// Assets that failed in this batch.
    pub failed: usize,
}

impl DownloadBatch {
    /// Outcome for an asset key.
    pub fn get(&self, key: &str) -> Option<&AssetOutcome> {
        self.outcomes.get(key)
    }

    /// Location for `asset`; the remote URL when it was never submitted.
    pub fn resolve(&self, asset: &AssetRef) -> String {
        self.outcomes
            .get(&asset.key)
            .map_or_else(|| asset.url.clone(), |outcome| outcome.location(asset))
    }

    /// Newly downloaded assets as `(key, path, identity)`, sorted by key.
    pub fn downloaded(&self) -> Vec<(&str, &Path, &ContentIdentity)> {
        let mut out: Vec<_> = self
            .outcomes
            .iter()
            .filter_map(|(key, outcome)| match outcome {
                AssetOutcome::Downloaded { path, identity, .. } => {
                    Some((key.as_str(), path.as_path(), identity))
                },
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    /// Whether any asset in the batch failed.
    pub fn has_failures(&self) -> bool {
        self.outcomes.values().any(AssetOutcome::is_failed)
    }
}

/// Fetch-and-store pipeline with in-run dedup.
pub struct Downloader {
    fetcher: Arc<dyn AssetFetcher>,
    static_dir: PathBuf,
    policy: RetryPolicy,
    optimizer: Option<ImageOptimizer>,
    concurrency: usize,
    verbosity: Verbosity,
    cancel: CancelFlag,
    progress: Option<ProgressCallback>,
    settled: HashMap<String, AssetOutcome>,
}

impl Downloader {
    /// Downloader writing under `config.paths.static_dir`.
    pub fn new(fetcher: Arc<dyn AssetFetcher>, config: &SyncConfig, cancel: CancelFlag) -> Self {
        Self {
            fetcher,
            static_dir: config.paths.static_dir.clone(),
            policy: RetryPolicy::from_config(&config.retry),
            optimizer: ImageOptimizer::from_config(&config.download),
            concurrency: config.download.effective_concurrency(),
            verbosity: config.verbosity,
            cancel,
            progress: None,
            settled: HashMap::new(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override image optimization; `None` stores images as fetched.
    #[must_use]
    pub const fn with_optimizer(mut self, optimizer: Option<ImageOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Report progress after each completed task.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Maximum simultaneous in-flight fetches.
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of assets settled so far this run.
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    /// Settle every asset in `assets`, fetching the ones without a local copy.
    pub async fn download(&mut self, assets: &[&AssetRef], cache: &SyncCache) -> DownloadBatch {
        let mut batch = DownloadBatch::default();
        let mut queued = HashSet::new();
        let mut tasks = Vec::new();

        for asset in assets {
            if let Some(previous) = self.settled.get(&asset.key) {
                batch.outcomes.insert(asset.key.clone(), previous.clone());
                continue;
            }
            if !queued.insert(asset.key.clone()) {
                continue;
            }
            if let Some(path) = self.local_copy(asset, cache) {
                debug!(key = %asset.key, path = %path.display(), "Reusing local asset");
                batch.reused += 1;
                self.settle(&mut batch, &asset.key, AssetOutcome::Reused { path });
                continue;
            }
            tasks.push(DownloadTask {
                asset: (*asset).clone(),
                destination: self.static_dir.join(asset.relative_path()),
            });
        }

        for (key, outcome) in self.run_tasks(tasks, cache).await {
            match &outcome {
                AssetOutcome::Downloaded { .. } => batch.fetched += 1,
                AssetOutcome::Failed { .. } => batch.failed += 1,
                AssetOutcome::Reused { .. } => batch.reused += 1,
            }
            self.settle(&mut batch, &key, outcome);
        }
        batch
    }

    fn settle(&mut self, batch: &mut DownloadBatch, key: &str, outcome: AssetOutcome) {
        self.settled.insert(key.to_string(), outcome.clone());
        batch.outcomes.insert(key.to_string(), outcome);
    }

    /// Existing local copy: the cached path, else the planned path.
    fn local_copy(&self, asset: &AssetRef, cache: &SyncCache) -> Option<PathBuf> {
        cached_copy(&self.static_dir, asset, cache).or_else(|| {
            let planned = asset.relative_path();
            self.static_dir.join(&planned).is_file().then_some(planned)
        })
    }

    async fn run_tasks(
        &self,
        tasks: Vec<DownloadTask>,
        cache: &SyncCache,
    ) -> Vec<(String, AssetOutcome)> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let total = tasks.len();
        let completed = Arc::new(AtomicUsize::new(0));

        // buffer_unordered polls at most `concurrency` tasks at once
        stream::iter(tasks)
            .map(|task| {
                let completed = Arc::clone(&completed);
                let progress = self.progress.clone();

                async move {
                    let outcome = if self.cancel.is_cancelled() {
                        debug!(key = %task.asset.key, "Cancelled before dispatch");
                        AssetOutcome::Failed {
                            reason: Error::Cancelled.to_string(),
                            fallback: cached_copy(&self.static_dir, &task.asset, cache),
                        }
                    } else {
                        self.fetch_one(&task, cache).await
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(cb) = progress {
                        cb(done, total);
                    }
                    (task.asset.key, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch_one(&self, task: &DownloadTask, cache: &SyncCache) -> AssetOutcome {
        let url = task.asset.url.as_str();
        let fetcher = self.fetcher.as_ref();
        let result = self
            .policy
            .run(&task.asset.key, || fetcher.fetch(url))
            .await;

        let error = match result {
            Ok(Retried {
                value: bytes,
                attempts,
                ..
            }) => match self.prepare(&task.asset, bytes).await {
                Ok(bytes) => match write_atomic_async(&task.destination, &bytes).await {
                    Ok(()) => {
                        let path = task.asset.relative_path();
                        if self.verbosity.reports_items() {
                            info!(key = %task.asset.key, path = %path.display(), bytes = bytes.len(), attempts, "Downloaded asset");
                        } else {
                            debug!(key = %task.asset.key, path = %path.display(), bytes = bytes.len(), attempts, "Downloaded asset");
                        }
                        return AssetOutcome::Downloaded {
                            path,
                            identity: ContentIdentity::from_bytes(&bytes),
                            attempts,
                        };
                    },
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        let fallback = cached_copy(&self.static_dir, &task.asset, cache);
        warn!(
            key = %task.asset.key,
            error = %error,
            fallback = fallback.as_ref().map_or("remote url", |_| "cached copy"),
            "Asset download failed"
        );
        AssetOutcome::Failed {
            reason: error,
            fallback,
        }
    }

    /// Bytes to store for `asset`; images are re-encoded off the runtime.
    async fn prepare(&self, asset: &AssetRef, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let Some(optimizer) = self.optimizer else {
            return Ok(bytes);
        };
        if asset.kind != MediaKind::Image {
            return Ok(bytes);
        }
        tokio::task::spawn_blocking(move || optimizer.apply(bytes))
            .await
            .map_err(|e| Error::Other(format!("image optimization task failed: {e}")))
    }
}

/// Cached path for `asset` if the file is still on disk.
fn cached_copy(static_dir: &Path, asset: &AssetRef, cache: &SyncCache) -> Option<PathBuf> {
    cache
        .get(&CacheKey::asset(asset.key.as_str()))
        .map(|entry| entry.path.clone())
        .filter(|path| !path.as_os_str().is_empty() && static_dir.join(path).is_file())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;

    /// Fetcher that fails the first `failures[url]` calls per URL.
    #[derive(Default)]
    struct MockFetcher {
        failures: HashMap<String, u32>,
        fatal: HashSet<String>,
        calls: Mutex<HashMap<String, u32>>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        payload: Option<Vec<u8>>,
        cancel_on_fetch: Option<CancelFlag>,
    }

    impl MockFetcher {
        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> u32 {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait::async_trait]
    impl AssetFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            if let Some(flag) = &self.cancel_on_fetch {
                flag.cancel();
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let n = {
                let mut calls = self.calls.lock().unwrap();
                let entry = calls.entry(url.to_string()).or_insert(0);
                *entry += 1;
                *entry
            };
            if self.fatal.contains(url) {
                return Err(Error::NotFound(url.to_string()));
            }
            if n <= self.failures.get(url).copied().unwrap_or(0) {
                return Err(Error::Timeout(format!("{url} attempt {n}")));
            }
            Ok(self
                .payload
                .clone()
                .unwrap_or_else(|| format!("bytes of {url}").into_bytes()))
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        use image::{ImageEncoder, Rgba, RgbaImage};
        let source = RgbaImage::from_pixel(width, height, Rgba([30, 60, 90, 128]));
        let mut out = Vec::new();
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(source.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .unwrap();
        out
    }

    fn config(dir: &Path, concurrency: usize) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.paths.static_dir = dir.join("static");
        config.download.concurrency = concurrency;
        config.retry.base_delay_ms = 1000;
        config.retry.backoff_multiplier = 2.0;
        config.retry.max_attempts = 3;
        config
    }

    fn image(url: &str) -> AssetRef {
        AssetRef::external(url, MediaKind::Image)
    }

    #[tokio::test]
    async fn test_duplicate_references_fetch_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::default());
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 4), CancelFlag::new());

        let a = image("https://cdn.example.com/img-42.png");
        let again = a.clone();
        let batch = downloader.download(&[&a, &again], &cache).await;
        assert_eq!(batch.fetched, 1);
        assert_eq!(fetcher.total_calls(), 1);

        // a later page referencing the same asset is served from the run state
        let second = downloader.download(&[&a], &cache).await;
        assert_eq!(second.fetched, 0);
        assert_eq!(fetcher.total_calls(), 1);
        assert_eq!(batch.resolve(&a), second.resolve(&a));
        assert_eq!(batch.resolve(&a), a.public_path());

        let files: Vec<_> = std::fs::read_dir(dir.path().join("static/images"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_pool_size() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher {
            delay: Duration::from_millis(20),
            ..MockFetcher::default()
        });
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 3), CancelFlag::new());

        let assets: Vec<AssetRef> = (0..12)
            .map(|i| image(&format!("https://cdn.example.com/{i}.png")))
            .collect();
        let refs: Vec<&AssetRef> = assets.iter().collect();
        let batch = downloader.download(&refs, &cache).await;

        assert_eq!(batch.fetched, 12);
        let peak = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let url = "https://cdn.example.com/img-99.png";
        let fetcher = Arc::new(MockFetcher {
            failures: HashMap::from([(url.to_string(), 2)]),
            ..MockFetcher::default()
        });
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 2), CancelFlag::new());

        let asset = image(url);
        let started = Instant::now();
        let batch = downloader.download(&[&asset], &cache).await;

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(fetcher.calls(url), 3);
        match batch.get(&asset.key).unwrap() {
            AssetOutcome::Downloaded { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("expected download, got {other:?}"),
        }
        assert_eq!(batch.downloaded().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_asset_falls_back_to_remote_url() {
        let dir = TempDir::new().unwrap();
        let url = "https://cdn.example.com/broken.png";
        let fetcher = Arc::new(MockFetcher {
            failures: HashMap::from([(url.to_string(), 10)]),
            ..MockFetcher::default()
        });
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 2), CancelFlag::new());

        let asset = image(url);
        let batch = downloader.download(&[&asset], &cache).await;
        assert_eq!(fetcher.calls(url), 3);
        assert_eq!(batch.failed, 1);
        assert!(batch.has_failures());
        assert_eq!(batch.resolve(&asset), url);
        assert!(batch.downloaded().is_empty());

        // settled as failed for the rest of the run
        let again = downloader.download(&[&asset], &cache).await;
        assert_eq!(fetcher.calls(url), 3);
        assert_eq!(again.resolve(&asset), url);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let url = "https://cdn.example.com/missing.png";
        let fetcher = Arc::new(MockFetcher {
            fatal: HashSet::from([url.to_string()]),
            ..MockFetcher::default()
        });
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 2), CancelFlag::new());

        let batch = downloader.download(&[&image(url)], &cache).await;
        assert_eq!(fetcher.calls(url), 1);
        assert_eq!(batch.failed, 1);
    }

    #[tokio::test]
    async fn test_cached_copy_is_reused_without_fetch() {
        let dir = TempDir::new().unwrap();
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(static_dir.join("images")).unwrap();
        std::fs::write(static_dir.join("images/old.png"), "x").unwrap();

        let asset = image("https://cdn.example.com/photo.png");
        let mut cache = SyncCache::new(dir.path().join("cache.json"));
        cache.put(
            CacheKey::asset(asset.key.clone()),
            CacheEntry::new(ContentIdentity::parse("sha256:x"), "images/old.png"),
        );

        let fetcher = Arc::new(MockFetcher::default());
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 2), CancelFlag::new());
        let batch = downloader.download(&[&asset], &cache).await;

        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(batch.reused, 1);
        assert_eq!(batch.resolve(&asset), "/images/old.png");
    }

    #[tokio::test]
    async fn test_cancelled_run_dispatches_nothing() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher::default());
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut downloader = Downloader::new(fetcher.clone(), &config(dir.path(), 2), cancel);

        let asset = image("https://cdn.example.com/a.png");
        let batch = downloader.download(&[&asset], &cache).await;
        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(batch.resolve(&asset), asset.url);
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_lets_in_flight_asset_finish() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::new();
        let fetcher = Arc::new(MockFetcher {
            delay: Duration::from_millis(20),
            cancel_on_fetch: Some(cancel.clone()),
            ..MockFetcher::default()
        });
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader = Downloader::new(fetcher.clone(), &config(dir.path(), 1), cancel);

        let assets: Vec<AssetRef> = (0..3)
            .map(|i| image(&format!("https://cdn.example.com/{i}.png")))
            .collect();
        let refs: Vec<&AssetRef> = assets.iter().collect();
        let batch = downloader.download(&refs, &cache).await;

        assert_eq!(fetcher.total_calls(), 1);
        assert_eq!(batch.fetched, 1);
        assert_eq!(batch.failed, 2);

        let first = dir.path().join("static").join(assets[0].relative_path());
        assert_eq!(
            std::fs::read(&first).unwrap(),
            format!("bytes of {}", assets[0].url).into_bytes()
        );
        for later in &assets[1..] {
            assert!(!dir.path().join("static").join(later.relative_path()).exists());
            assert_eq!(batch.resolve(later), later.url);
        }
    }

    #[tokio::test]
    async fn test_images_are_optimized_before_write() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(MockFetcher {
            payload: Some(png(300, 30)),
            ..MockFetcher::default()
        });
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 2), CancelFlag::new())
                .with_optimizer(Some(ImageOptimizer::new(100, 85)));

        let asset = image("https://cdn.example.com/wide.png");
        let batch = downloader.download(&[&asset], &cache).await;
        assert_eq!(batch.fetched, 1);

        let written = std::fs::read(dir.path().join("static").join(asset.relative_path())).unwrap();
        assert_eq!(image::guess_format(&written).unwrap(), image::ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&written).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 10));

        let recorded = batch.downloaded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(*recorded[0].2, ContentIdentity::from_bytes(&written));
    }

    #[tokio::test]
    async fn test_attachments_and_disabled_optimizer_keep_fetched_bytes() {
        let dir = TempDir::new().unwrap();
        let raw = png(300, 30);
        let fetcher = Arc::new(MockFetcher {
            payload: Some(raw.clone()),
            ..MockFetcher::default()
        });
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader =
            Downloader::new(fetcher.clone(), &config(dir.path(), 2), CancelFlag::new());

        let attachment = AssetRef::external("https://cdn.example.com/diagram.png", MediaKind::File);
        downloader.download(&[&attachment], &cache).await;
        let stored = dir.path().join("static").join(attachment.relative_path());
        assert_eq!(std::fs::read(stored).unwrap(), raw);

        let mut config = config(dir.path(), 2);
        config.download.optimize_images = false;
        let mut plain = Downloader::new(fetcher, &config, CancelFlag::new());
        let asset = image("https://cdn.example.com/kept.png");
        plain.download(&[&asset], &cache).await;
        let stored = dir.path().join("static").join(asset.relative_path());
        assert_eq!(std::fs::read(stored).unwrap(), raw);
    }

    #[tokio::test]
    async fn test_progress_reports_every_task() {
        let dir = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache = SyncCache::new(dir.path().join("cache.json"));
        let mut downloader = Downloader::new(
            Arc::new(MockFetcher::default()),
            &config(dir.path(), 2),
            CancelFlag::new(),
        )
        .with_progress(move |done, total| sink.lock().unwrap().push((done, total)));

        let a = image("https://cdn.example.com/1.png");
        let b = image("https://cdn.example.com/2.png");
        downloader.download(&[&a, &b], &cache).await;

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_public_path_uses_forward_slashes() {
        assert_eq!(public_path(Path::new("images/a.png")), "/images/a.png");
    }

    mod http_fetcher {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn test_http_fetcher_maps_statuses() -> anyhow::Result<()> {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/ok.png"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/gone.png"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/busy.png"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let fetcher = HttpFetcher::new(&DownloadConfig::default())?;
            let bytes = fetcher.fetch(&format!("{}/ok.png", server.uri())).await?;
            assert_eq!(bytes, vec![1, 2, 3]);

            let err = fetcher
                .fetch(&format!("{}/gone.png", server.uri()))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NotFound(_)));
            assert!(!err.is_recoverable());

            let err = fetcher
                .fetch(&format!("{}/busy.png", server.uri()))
                .await
                .unwrap_err();
            assert!(err.is_recoverable());
            Ok(())
        }
    }
}
