//! Provider detection for embeds and external videos.
//!
//! Only URL inspection happens here; nothing is fetched.

use std::sync::LazyLock;

use html_escape::encode_double_quoted_attribute;
use regex::Regex;

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static YOUTUBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/|shorts/)|youtu\.be/)([A-Za-z0-9_-]+)",
    )
    .unwrap()
});

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static VIMEO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vimeo\.com/(?:video/)?(\d+)").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static TWEET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:twitter\.com|x\.com)/([A-Za-z0-9_]+)/status(?:es)?/(\d+)").unwrap()
});

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static GIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"gist\.github\.com/([A-Za-z0-9_-]+)/([0-9a-fA-F]+)").unwrap());

/// A recognised embed provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// YouTube video id.
    YouTube(String),
    /// Vimeo video id.
    Vimeo(String),
    /// Tweet author and status id.
    Tweet {
        /// Account handle.
        user: String,
        /// Status id.
        id: String,
    },
    /// Gist owner and id.
    Gist {
        /// Owner handle.
        user: String,
        /// Gist id.
        id: String,
    },
}

impl Provider {
    /// Detect the provider behind `url`.
    pub fn detect(url: &str) -> Option<Self> {
        let capture = |re: &Regex, idx: usize| {
            re.captures(url)
                .and_then(|c| c.get(idx))
                .map(|m| m.as_str().to_string())
        };

        if let Some(id) = capture(&YOUTUBE_RE, 1) {
            return Some(Self::YouTube(id));
        }
        if let Some(id) = capture(&VIMEO_RE, 1) {
            return Some(Self::Vimeo(id));
        }
        if let (Some(user), Some(id)) = (capture(&TWEET_RE, 1), capture(&TWEET_RE, 2)) {
            return Some(Self::Tweet { user, id });
        }
        if let (Some(user), Some(id)) = (capture(&GIST_RE, 1), capture(&GIST_RE, 2)) {
            return Some(Self::Gist { user, id });
        }
        None
    }

    /// Whether the provider hosts video.
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::YouTube(_) | Self::Vimeo(_))
    }

    /// Hugo shortcode for this provider.
    pub fn shortcode(&self) -> String {
        match self {
            Self::YouTube(id) => format!("{{{{< youtube \"{id}\" >}}}}"),
            Self::Vimeo(id) => format!("{{{{< vimeo \"{id}\" >}}}}"),
            Self::Tweet { user, id } => format!("{{{{< tweet user=\"{user}\" id=\"{id}\" >}}}}"),
            Self::Gist { user, id } => format!("{{{{< gist {user} {id} >}}}}"),
        }
    }
}

/// Markup for an embed block: a shortcode for known providers, else an iframe.
pub fn render_embed(url: &str) -> String {
    Provider::detect(url).map_or_else(|| iframe(url, "400px"), |p| p.shortcode())
}

/// Markup for an externally hosted video.
pub fn render_external_video(url: &str) -> String {
    match Provider::detect(url) {
        Some(provider) if provider.is_video() => provider.shortcode(),
        _ => format!(
            "<video src=\"{}\" controls></video>",
            encode_double_quoted_attribute(url)
        ),
    }
}

/// Full-width iframe with the given height.
pub fn iframe(src: &str, height: &str) -> String {
    format!(
        "<iframe src=\"{}\" style=\"width:100%; height:{height};\"></iframe>",
        encode_double_quoted_attribute(src)
    )
}
