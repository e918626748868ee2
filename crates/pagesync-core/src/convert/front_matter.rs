//! Document header, YAML between `---` fences or TOML between `+++` fences.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::Result;
use crate::config::FrontMatterFormat;
use crate::types::PageMeta;

/// Header fields written at the top of every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontMatter {
    /// Page title.
    pub title: String,
    /// Publication date, RFC 3339.
    pub date: String,
    /// Last remote edit, RFC 3339.
    pub lastmod: String,
    /// URL slug.
    pub slug: String,
    /// Tags in remote order.
    pub tags: Vec<String>,
    /// Unpublished page.
    pub draft: bool,
    /// Enables math rendering in the theme.
    pub math: bool,
    /// Cover image location, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl FrontMatter {
    /// Header for `meta` without a cover.
    pub fn from_meta(meta: &PageMeta, math: bool) -> Self {
        Self {
            title: meta.title.clone(),
            date: timestamp(&meta.date),
            lastmod: timestamp(&meta.last_edited),
            slug: meta.slug.clone(),
            tags: meta.tags.clone(),
            draft: !meta.published,
            math,
            cover: None,
        }
    }

    /// Fenced header block in `format`, ending with a newline.
    pub fn render(&self, format: FrontMatterFormat) -> Result<String> {
        match format {
            FrontMatterFormat::Yaml => {
                let body = serde_yaml::to_string(self)?;
                Ok(format!("---\n{body}---\n"))
            },
            FrontMatterFormat::Toml => {
                let body = toml::to_string(self)?;
                Ok(format!("+++\n{body}+++\n"))
            },
        }
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
