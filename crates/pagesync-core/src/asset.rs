//! Asset references and their local layout.
//!
//! An [`AssetRef`] is created by the converter for every media URL it
//! encounters. Its [`key`](AssetRef::key) identifies the asset across pages
//! and runs: two blocks referencing the same key resolve to one local file.
//!
//! Hosted files come back from the content source as signed URLs whose
//! query string rotates on every listing, so their key drops the query and
//! fragment. External URLs are kept verbatim.
//!
//! ## Layout
//!
//! ```text
//! static/
//!   images/3f2a9c1d0b7e.png
//!   videos/91ab02cd33ef.mp4
//!   audio/…
//!   files/…
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::block::{MediaKind, MediaSource, sha256_hex};

/// Reference to a remote asset discovered during conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    /// URL to fetch the bytes from.
    pub url: String,
    /// Stable identity used for dedup and cache lookup.
    pub key: String,
    /// Media kind; decides the target directory.
    pub kind: MediaKind,
}

impl AssetRef {
    /// Build a reference for a media source.
    pub fn new(source: &MediaSource, kind: MediaKind) -> Self {
        let url = source.url().to_string();
        let key = if source.is_hosted() {
            strip_volatile(&url)
        } else {
            url.clone()
        };
        Self { url, key, kind }
    }

    /// Build a reference whose key is the URL itself.
    pub fn external(url: impl Into<String>, kind: MediaKind) -> Self {
        let url = url.into();
        Self {
            key: url.clone(),
            url,
            kind,
        }
    }

    /// File name in the kind directory: `<sha256-12>.<ext>`.
    pub fn file_name(&self) -> String {
        let digest = sha256_hex(self.key.as_bytes());
        let stem = &digest[..12];
        format!("{stem}.{}", self.extension())
    }

    /// Path relative to the static root, e.g. `images/3f2a9c1d0b7e.png`.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind.directory()).join(self.file_name())
    }

    /// Site-absolute URL path used in documents, e.g. `/images/3f2a9c1d0b7e.png`.
    pub fn public_path(&self) -> String {
        format!("/{}/{}", self.kind.directory(), self.file_name())
    }

    fn extension(&self) -> String {
        url_extension(&self.key).unwrap_or_else(|| self.kind.default_extension().to_string())
    }
}

/// Drop query string and fragment.
fn strip_volatile(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        },
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_string(),
    }
}

/// Lower-cased extension of the last path segment, if it looks like one.
fn url_extension(url: &str) -> Option<String> {
    let path = url::Url::parse(url).map_or_else(
        |_| url.split(['?', '#']).next().unwrap_or(url).to_string(),
        |parsed| parsed.path().to_string(),
    );
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}
