//! Page records and content identity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::{Block, MediaSource, sha256_hex, structural_hash};

/// Marker used to decide whether a page changed since the last sync.
///
/// A remote revision stamp is authoritative whenever the source provides
/// one. Only sources without revisions fall back to a structural hash of
/// the block tree. The two forms never compare equal, so a source switching
/// identity kind forces a rewrite instead of a false skip.
///
/// ```rust
/// use pagesync_core::ContentIdentity;
///
/// let rev = ContentIdentity::revision("2024-05-01T10:00:00.000Z");
/// assert_eq!(rev.as_str(), "rev:2024-05-01T10:00:00.000Z");
/// assert_ne!(rev, ContentIdentity::parse("sha256:2024-05-01T10:00:00.000Z"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentIdentity(String);

impl ContentIdentity {
    const REVISION_PREFIX: &'static str = "rev:";
    const HASH_PREFIX: &'static str = "sha256:";

    /// Identity from a remote revision stamp.
    pub fn revision(stamp: &str) -> Self {
        Self(format!("{}{stamp}", Self::REVISION_PREFIX))
    }

    /// Identity from a structural hash of the page's blocks.
    pub fn from_blocks(blocks: &[Block]) -> Self {
        Self(format!("{}{}", Self::HASH_PREFIX, structural_hash(blocks)))
    }

    /// Identity of raw bytes, used for downloaded assets.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{}{}", Self::HASH_PREFIX, sha256_hex(bytes)))
    }

    /// Rehydrate a stored identity string.
    pub fn parse(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// Whether this identity came from a remote revision stamp.
    pub fn is_revision(&self) -> bool {
        self.0.starts_with(Self::REVISION_PREFIX)
    }

    /// Stored representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared metadata of a page, rendered into the document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Page title; `"Untitled"` when the remote has none.
    pub title: String,
    /// URL slug and output file stem.
    pub slug: String,
    /// Publication date.
    pub date: DateTime<Utc>,
    /// Last remote edit.
    pub last_edited: DateTime<Utc>,
    /// Tags in remote order.
    pub tags: Vec<String>,
    /// Publish flag; unpublished pages are drafts.
    pub published: bool,
    /// Cover image, if any.
    pub cover: Option<MediaSource>,
}

/// A page as listed by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Remote page identifier.
    pub id: String,
    /// Remote revision marker, when the source provides one.
    pub revision: Option<String>,
    /// Declared metadata.
    pub meta: PageMeta,
}

impl PageRecord {
    /// Fallback title for pages without one.
    pub const UNTITLED: &'static str = "Untitled";

    /// Identity derivable from the listing alone.
    ///
    /// `None` means the caller has to fetch the block tree and hash it.
    pub fn listed_identity(&self) -> Option<ContentIdentity> {
        self.revision.as_deref().map(ContentIdentity::revision)
    }

    /// Default slug for a page id: the id without dashes.
    pub fn default_slug(id: &str) -> String {
        id.replace('-', "")
    }
}
