//! Change-detection cache.
//!
//! The cache maps page ids and asset keys to the identity last written for
//! them and where the result lives on disk. A missing key means "never
//! synced"; there is no TTL. The sync engine is the only writer and calls
//! [`SyncCache::flush`] once per run.
//!
//! ## On-disk format
//!
//! ```json
//! {
//!   "version": 2,
//!   "last_sync": "2024-05-01T10:00:00Z",
//!   "pages":  { "<page-id>":   { "identity": "rev:…", "path": "content/posts/x.md", "updated_at": "…" } },
//!   "assets": { "<asset-key>": { "identity": "sha256:…", "path": "images/ab12….png", "updated_at": "…" } }
//! }
//! ```
//!
//! Page paths are document paths as written. Asset paths are relative to the
//! static root.
//!
//! Version 1 files (`{"last_sync", "posts": {id: timestamp}, "media": {url: path}}`)
//! are migrated on load. Files from a newer version are refused instead of
//! being overwritten.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::write_atomic;
use crate::types::ContentIdentity;
use crate::{Error, Result};

/// Current on-disk schema version.
pub const CACHE_VERSION: u32 = 2;

/// Identity placeholder for entries migrated without one.
const UNKNOWN_IDENTITY: &str = "unknown";

/// What a cache entry describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// A page, keyed by its remote id.
    Page(String),
    /// A downloaded asset, keyed by [`AssetRef::key`](crate::AssetRef::key).
    Asset(String),
}

impl CacheKey {
    /// Key for a page id.
    pub fn page(id: impl Into<String>) -> Self {
        Self::Page(id.into())
    }

    /// Key for an asset reference.
    pub fn asset(key: impl Into<String>) -> Self {
        Self::Asset(key.into())
    }
}

/// Last-synced state of one page or asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Content identity at the time of the write.
    pub identity: ContentIdentity,
    /// Where the output was written.
    pub path: PathBuf,
    /// When the entry was recorded.
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry stamped with the current time.
    pub fn new(identity: ContentIdentity, path: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            path: path.into(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pages: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    assets: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Deserialize)]
struct CacheFileV1 {
    #[serde(default)]
    last_sync: Option<String>,
    #[serde(default)]
    posts: BTreeMap<String, String>,
    #[serde(default)]
    media: BTreeMap<String, String>,
}

impl CacheFileV1 {
    fn migrate(self) -> CacheFile {
        let stamp = |raw: Option<&str>| {
            raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc))
        };
        let last_sync = self
            .last_sync
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        // v1 never recorded document paths; an empty path reads as missing
        let pages = self
            .posts
            .into_iter()
            .map(|(id, edited)| {
                let entry = CacheEntry {
                    identity: ContentIdentity::revision(&edited),
                    path: PathBuf::new(),
                    updated_at: stamp(Some(&edited)),
                };
                (id, entry)
            })
            .collect();

        let assets = self
            .media
            .into_iter()
            .map(|(url, public)| {
                let entry = CacheEntry {
                    identity: ContentIdentity::parse(UNKNOWN_IDENTITY),
                    path: PathBuf::from(public.trim_start_matches('/')),
                    updated_at: stamp(self.last_sync.as_deref()),
                };
                (url, entry)
            })
            .collect();

        CacheFile {
            version: CACHE_VERSION,
            last_sync,
            pages,
            assets,
        }
    }
}

/// Persistent key to entry store with atomic flush.
#[derive(Debug)]
pub struct SyncCache {
    path: PathBuf,
    file: CacheFile,
    dirty: bool,
}

impl SyncCache {
    /// Empty cache that will be flushed to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: CacheFile {
                version: CACHE_VERSION,
                ..CacheFile::default()
            },
            dirty: false,
        }
    }

    /// Load the cache at `path`, or start empty if no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the file exists but is unreadable,
    /// corrupt, or was written by a newer schema version.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "No cache file, starting empty");
            return Ok(Self::new(path));
        }

        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("Failed to read cache {}: {e}", path.display())))?;
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            Error::Storage(format!("Cache file {} is corrupt: {e}", path.display()))
        })?;

        let (file, migrated) = Self::decode(value).map_err(|msg| {
            Error::Storage(format!("Cache file {}: {msg}", path.display()))
        })?;
        if migrated {
            info!(
                path = %path.display(),
                pages = file.pages.len(),
                assets = file.assets.len(),
                "Migrated cache from version 1"
            );
        }

        Ok(Self {
            path,
            file,
            dirty: migrated,
        })
    }

    fn decode(value: serde_json::Value) -> std::result::Result<(CacheFile, bool), String> {
        let version = value.get("version").and_then(serde_json::Value::as_u64);
        match version {
            Some(v) if v == u64::from(CACHE_VERSION) => serde_json::from_value(value)
                .map(|file| (file, false))
                .map_err(|e| format!("corrupt version {v} data: {e}")),
            Some(v) if v > u64::from(CACHE_VERSION) => Err(format!(
                "written by a newer pagesync (version {v}, this build understands {CACHE_VERSION})"
            )),
            Some(1) | None if value.is_object() => serde_json::from_value::<CacheFileV1>(value)
                .map(|v1| (v1.migrate(), true))
                .map_err(|e| format!("corrupt version 1 data: {e}")),
            Some(v) => Err(format!("unsupported version {v}")),
            None => Err("expected a JSON object".to_string()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up an entry. `None` means never synced.
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        match key {
            CacheKey::Page(id) => self.file.pages.get(id),
            CacheKey::Asset(k) => self.file.assets.get(k),
        }
    }

    /// Insert or replace an entry.
    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.dirty = true;
        match key {
            CacheKey::Page(id) => self.file.pages.insert(id, entry),
            CacheKey::Asset(k) => self.file.assets.insert(k, entry),
        };
    }

    /// Drop an entry, returning it if present.
    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = match key {
            CacheKey::Page(id) => self.file.pages.remove(id),
            CacheKey::Asset(k) => self.file.assets.remove(k),
        };
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Ids of every cached page, in key order.
    pub fn page_ids(&self) -> impl Iterator<Item = &str> {
        self.file.pages.keys().map(String::as_str)
    }

    /// Number of page entries.
    pub fn page_count(&self) -> usize {
        self.file.pages.len()
    }

    /// Number of asset entries.
    pub fn asset_count(&self) -> usize {
        self.file.assets.len()
    }

    /// Time of the last completed run.
    pub const fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.file.last_sync
    }

    /// Record the completion time of a run.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.file.last_sync = Some(at);
        self.dirty = true;
    }

    /// Drop entries whose file no longer exists.
    ///
    /// Asset paths are resolved against `static_dir`. Returns the number of
    /// entries removed.
    pub fn retain_existing(&mut self, static_dir: &Path) -> usize {
        let before = self.file.pages.len() + self.file.assets.len();
        self.file
            .pages
            .retain(|_, entry| !entry.path.as_os_str().is_empty() && entry.path.is_file());
        self.file
            .assets
            .retain(|_, entry| static_dir.join(&entry.path).is_file());
        let removed = before - (self.file.pages.len() + self.file.assets.len());
        if removed > 0 {
            self.dirty = true;
            debug!(removed, "Dropped cache entries pointing at missing files");
        }
        removed
    }

    /// Whether there are unflushed changes.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist atomically. A crash mid-flush leaves the previous file intact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be written; the caller
    /// treats this as fatal.
    pub fn flush(&mut self) -> Result<()> {
        self.file.version = CACHE_VERSION;
        let json = serde_json::to_vec_pretty(&self.file)?;
        write_atomic(&self.path, &json).map_err(|e| match e {
            Error::Storage(msg) => Error::Storage(format!("Cache flush failed: {msg}")),
            other => other,
        })?;
        if self.dirty {
            debug!(
                path = %self.path.display(),
                pages = self.file.pages.len(),
                assets = self.file.assets.len(),
                "Flushed cache"
            );
        }
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ErrorClass;
    use tempfile::TempDir;

    fn entry(identity: &str, path: &Path) -> CacheEntry {
        CacheEntry::new(ContentIdentity::parse(identity), path)
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let cache = SyncCache::load(dir.path().join("cache.json")).unwrap();
        assert_eq!(cache.page_count(), 0);
        assert!(cache.get(&CacheKey::page("p")).is_none());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_put_flush_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let doc = dir.path().join("p.md");
        fs::write(&doc, "x").unwrap();

        let mut cache = SyncCache::load(&path).unwrap();
        cache.put(CacheKey::page("p"), entry("rev:7", &doc));
        cache.put(
            CacheKey::asset("https://x/a.png"),
            entry("sha256:ab", Path::new("images/a.png")),
        );
        assert!(cache.is_dirty());
        cache.flush().unwrap();
        assert!(!cache.is_dirty());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 2);

        let reloaded = SyncCache::load(&path).unwrap();
        let page = reloaded.get(&CacheKey::page("p")).unwrap();
        assert_eq!(page.identity.as_str(), "rev:7");
        assert_eq!(page.path, doc);
        assert!(
            reloaded
                .get(&CacheKey::asset("https://x/a.png"))
                .is_some()
        );
        // page and asset namespaces are separate
        assert!(reloaded.get(&CacheKey::asset("p")).is_none());
    }

    #[test]
    fn test_flush_failure_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = SyncCache::new(&path);
        cache.put(CacheKey::page("a"), entry("rev:1", Path::new("a.md")));
        cache.flush().unwrap();
        let before = fs::read_to_string(&path).unwrap();

        // a directory squatting on the temp path makes the write fail
        fs::create_dir(dir.path().join("cache.json.tmp")).unwrap();
        cache.put(CacheKey::page("b"), entry("rev:2", Path::new("b.md")));
        let err = cache.flush().unwrap_err();
        assert_eq!(err.class(), ErrorClass::FatalLocal);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_v1_file_is_migrated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{
                "last_sync": "2024-03-01T12:00:00+00:00",
                "posts": {"page-1": "2024-02-28T09:30:00.000Z"},
                "media": {"https://x/a.png": "/images/abc.png"}
            }"#,
        )
        .unwrap();

        let cache = SyncCache::load(&path).unwrap();
        assert!(cache.is_dirty());
        let page = cache.get(&CacheKey::page("page-1")).unwrap();
        assert_eq!(page.identity.as_str(), "rev:2024-02-28T09:30:00.000Z");
        assert!(page.path.as_os_str().is_empty());
        let asset = cache.get(&CacheKey::asset("https://x/a.png")).unwrap();
        assert_eq!(asset.path, PathBuf::from("images/abc.png"));
        assert!(cache.last_sync().is_some());
    }

    #[test]
    fn test_newer_version_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{"version": 99, "pages": {}}"#).unwrap();
        let err = SyncCache::load(&path).unwrap_err();
        assert!(matches!(err, Error::Storage(ref m) if m.contains("newer")));
        assert_eq!(err.class(), ErrorClass::FatalLocal);
    }

    #[test]
    fn test_corrupt_file_is_fatal_local() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        let err = SyncCache::load(&path).unwrap_err();
        assert_eq!(err.class(), ErrorClass::FatalLocal);

        fs::write(&path, "[1, 2]").unwrap();
        assert!(SyncCache::load(&path).is_err());
    }

    #[test]
    fn test_retain_existing_drops_dangling_entries() {
        let dir = TempDir::new().unwrap();
        let static_dir = dir.path().join("static");
        fs::create_dir_all(static_dir.join("images")).unwrap();
        fs::write(static_dir.join("images/keep.png"), "x").unwrap();
        let doc = dir.path().join("keep.md");
        fs::write(&doc, "x").unwrap();

        let mut cache = SyncCache::new(dir.path().join("cache.json"));
        cache.put(CacheKey::page("keep"), entry("rev:1", &doc));
        cache.put(CacheKey::page("gone"), entry("rev:1", &dir.path().join("gone.md")));
        cache.put(CacheKey::page("v1"), entry("rev:1", Path::new("")));
        cache.put(CacheKey::asset("k"), entry("x", Path::new("images/keep.png")));
        cache.put(CacheKey::asset("g"), entry("x", Path::new("images/gone.png")));

        assert_eq!(cache.retain_existing(&static_dir), 3);
        assert_eq!(cache.page_ids().collect::<Vec<_>>(), vec!["keep"]);
        assert_eq!(cache.asset_count(), 1);
    }

    #[test]
    fn test_remove_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = SyncCache::new(&path);
        cache.put(CacheKey::page("a"), entry("rev:1", Path::new("a.md")));
        cache.flush().unwrap();
        assert!(cache.remove(&CacheKey::page("a")).is_some());
        assert!(cache.remove(&CacheKey::page("a")).is_none());
        assert!(cache.is_dirty());
    }
}
