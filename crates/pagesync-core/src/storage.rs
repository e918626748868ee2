//! Atomic file writes shared by the cache, the document writer and the
//! downloader.
//!
//! Every write lands in a sibling `*.tmp` file first, is flushed to disk and
//! then renamed over the target, so readers only ever observe the old or the
//! new content, even across a crash.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{Error, Result};

/// Sibling temp path: `name.ext` becomes `name.ext.tmp`.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Create the parent directory of `path` if it has one.
fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Storage(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}

/// Write and fsync `contents` into a fresh file at `tmp`.
fn write_synced(tmp: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(contents)?;
    file.sync_all()
}

async fn write_synced_async(tmp: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

/// Write `contents` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    write_synced(&tmp, contents).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::Storage(format!("Failed to write {}: {e}", tmp.display()))
    })?;

    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path).map_err(|e| {
            Error::Storage(format!("Failed to remove existing {}: {e}", path.display()))
        })?;
    }

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::Storage(format!("Failed to commit {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "Wrote file");
    Ok(())
}

/// Async variant of [`write_atomic`] for the download workers.
pub async fn write_atomic_async(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            Error::Storage(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }
    let tmp = tmp_path(path);
    if let Err(e) = write_synced_async(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::Storage(format!(
            "Failed to write {}: {e}",
            tmp.display()
        )));
    }

    #[cfg(target_os = "windows")]
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let _ = tokio::fs::remove_file(path).await;
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::Storage(format!(
            "Failed to commit {}: {e}",
            path.display()
        )));
    }
    Ok(())
}
