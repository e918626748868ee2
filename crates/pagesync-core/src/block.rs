//! Typed content-block tree.
//!
//! A page body is a forest of [`Block`]s. Each block carries a closed
//! [`BlockKind`] whose variants hold the type-specific properties, plus its
//! ordered children. Unknown remote type tags are preserved as
//! [`BlockKind::Unsupported`] so the converter can degrade gracefully as the
//! remote content model evolves.
//!
//! The tree is an immutable snapshot for the duration of a run.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Text styling flags on a rich-text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    /// Bold text.
    pub bold: bool,
    /// Italic text.
    pub italic: bool,
    /// Struck-through text.
    pub strikethrough: bool,
    /// Underlined text.
    pub underline: bool,
    /// Inline code.
    pub code: bool,
    /// Named color; `"default"` means no color.
    pub color: String,
}

impl Annotations {
    /// Whether a non-default color is set.
    pub fn has_color(&self) -> bool {
        !self.color.is_empty() && self.color != "default"
    }
}

/// One run of uniformly styled text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RichText {
    /// Unformatted text content.
    pub plain_text: String,
    /// Link target, if the run is a link.
    #[serde(default)]
    pub href: Option<String>,
    /// Styling.
    #[serde(default)]
    pub annotations: Annotations,
    /// The run is an inline equation; `plain_text` holds the expression.
    #[serde(default)]
    pub equation: bool,
}

impl RichText {
    /// Unstyled run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: text.into(),
            ..Self::default()
        }
    }
}

/// Concatenate the plain text of a sequence of runs.
pub fn plain_text(runs: &[RichText]) -> String {
    runs.iter().map(|rt| rt.plain_text.as_str()).collect()
}

/// Kind of media a block or cover refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video file.
    Video,
    /// Audio file.
    Audio,
    /// PDF document.
    Pdf,
    /// Any other attachment.
    File,
}

impl MediaKind {
    /// Directory under the static root that stores this kind of asset.
    pub const fn directory(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Video => "videos",
            Self::Audio => "audio",
            Self::Pdf | Self::File => "files",
        }
    }

    /// Extension used when the URL path carries none.
    pub const fn default_extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
            Self::Audio => "mp3",
            Self::Pdf => "pdf",
            Self::File => "bin",
        }
    }
}

/// Where a media block's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "url", rename_all = "snake_case")]
pub enum MediaSource {
    /// Linked from a third-party host; left as-is unless it is a file we mirror.
    External(String),
    /// Hosted by the content source behind an expiring signed URL.
    Hosted(String),
}

impl MediaSource {
    /// The URL regardless of hosting.
    pub fn url(&self) -> &str {
        match self {
            Self::External(url) | Self::Hosted(url) => url,
        }
    }

    /// Whether the bytes are hosted by the content source.
    pub const fn is_hosted(&self) -> bool {
        matches!(self, Self::Hosted(_))
    }
}

/// Type tag and type-specific properties of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// Plain paragraph.
    Paragraph {
        /// Paragraph text.
        text: Vec<RichText>,
    },
    /// Heading of level 1..=6.
    Heading {
        /// Heading level.
        level: u8,
        /// Heading text.
        text: Vec<RichText>,
    },
    /// Unordered list item; children nest under it.
    BulletedListItem {
        /// Item text.
        text: Vec<RichText>,
    },
    /// Ordered list item; children nest under it.
    NumberedListItem {
        /// Item text.
        text: Vec<RichText>,
    },
    /// Checklist item.
    ToDo {
        /// Item text.
        text: Vec<RichText>,
        /// Whether the box is ticked.
        checked: bool,
    },
    /// Fenced code block.
    Code {
        /// Source text.
        text: Vec<RichText>,
        /// Language tag, possibly empty.
        language: String,
        /// Optional caption.
        caption: Vec<RichText>,
    },
    /// Block quote.
    Quote {
        /// Quoted text.
        text: Vec<RichText>,
    },
    /// Collapsible section; children form the body.
    Toggle {
        /// Summary text.
        text: Vec<RichText>,
    },
    /// Highlighted note with an icon.
    Callout {
        /// Callout text.
        text: Vec<RichText>,
        /// Emoji icon, if any.
        icon: Option<String>,
    },
    /// Horizontal rule.
    Divider,
    /// Table; its children are [`BlockKind::TableRow`]s.
    Table {
        /// First row is a header.
        has_column_header: bool,
    },
    /// One table row.
    TableRow {
        /// Cell contents.
        cells: Vec<Vec<RichText>>,
    },
    /// Embedded third-party content.
    Embed {
        /// Provider URL.
        url: String,
        /// Optional caption.
        caption: Vec<RichText>,
    },
    /// Link preview card.
    Bookmark {
        /// Target URL.
        url: String,
        /// Optional caption.
        caption: Vec<RichText>,
    },
    /// Display math.
    Equation {
        /// Expression source (TeX).
        expression: String,
    },
    /// Image, video, audio, PDF or file attachment.
    Media {
        /// Media kind.
        kind: MediaKind,
        /// Location of the bytes.
        source: MediaSource,
        /// Optional caption.
        caption: Vec<RichText>,
    },
    /// A type tag this version does not understand.
    Unsupported {
        /// Remote type tag as received.
        type_tag: String,
        /// Any plain text that could be salvaged from the payload.
        plain_text: String,
    },
}

impl BlockKind {
    /// Short type tag used in logs.
    pub fn tag(&self) -> &str {
        match self {
            Self::Paragraph { .. } => "paragraph",
            Self::Heading { .. } => "heading",
            Self::BulletedListItem { .. } => "bulleted_list_item",
            Self::NumberedListItem { .. } => "numbered_list_item",
            Self::ToDo { .. } => "to_do",
            Self::Code { .. } => "code",
            Self::Quote { .. } => "quote",
            Self::Toggle { .. } => "toggle",
            Self::Callout { .. } => "callout",
            Self::Divider => "divider",
            Self::Table { .. } => "table",
            Self::TableRow { .. } => "table_row",
            Self::Embed { .. } => "embed",
            Self::Bookmark { .. } => "bookmark",
            Self::Equation { .. } => "equation",
            Self::Media { kind, .. } => match kind {
                MediaKind::Image => "image",
                MediaKind::Video => "video",
                MediaKind::Audio => "audio",
                MediaKind::Pdf => "pdf",
                MediaKind::File => "file",
            },
            Self::Unsupported { type_tag, .. } => type_tag,
        }
    }

    /// Primary rich text of the block, if it has any.
    pub fn text(&self) -> &[RichText] {
        match self {
            Self::Paragraph { text }
            | Self::Heading { text, .. }
            | Self::BulletedListItem { text }
            | Self::NumberedListItem { text }
            | Self::ToDo { text, .. }
            | Self::Code { text, .. }
            | Self::Quote { text }
            | Self::Toggle { text }
            | Self::Callout { text, .. } => text,
            _ => &[],
        }
    }
}

/// A node in a page's structural tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// Remote block identifier.
    pub id: String,
    /// Type tag and properties.
    #[serde(flatten)]
    pub kind: BlockKind,
    /// Ordered child blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

impl Block {
    /// Leaf block.
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
        }
    }

    /// Attach children using builder pattern.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first pre-order walk over `blocks` and all descendants.
    pub fn walk<'a>(blocks: &'a [Self], visit: &mut impl FnMut(&'a Self)) {
        for block in blocks {
            visit(block);
            Self::walk(&block.children, visit);
        }
    }
}

/// Structural SHA-256 of a block forest, hex encoded.
///
/// Used as the content identity for sources that provide no revision
/// marker. Serialization is field-ordered, so equal trees hash equally.
pub fn structural_hash(blocks: &[Block]) -> String {
    // serde_json on owned structs with no maps is deterministic
    let encoded = serde_json::to_vec(blocks).unwrap_or_default();
    sha256_hex(&encoded)
}

/// Lower-case hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
