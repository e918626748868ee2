//! Block tree to Markdown conversion.
//!
//! [`Converter`] walks a [`Block`] forest depth first and dispatches each
//! node on its [`BlockKind`]. Producers write into a shared [`Context`]
//! that tracks the current indentation prefix (list nesting, quotes) and
//! collects every asset the tree references.
//!
//! Asset locations are not known while converting: downloads run after
//! conversion. The output is therefore a [`Fragment`] whose asset positions
//! are placeholders, resolved by [`Fragment::render`] once the downloader has
//! settled.
//!
//! Conversion is pure. It never touches the network or the clock, and
//! iterates only over ordered collections, so the same tree always renders
//! to the same bytes.
//!
//! Unknown block types never fail conversion. They fall back to their
//! plain text (or an HTML comment marker when there is none) and are
//! reported as [`ConversionWarning`]s.

mod embed;
mod front_matter;
mod rich_text;

use std::collections::HashMap;
use std::fmt;

use html_escape::encode_double_quoted_attribute;
use tracing::warn;

use crate::Result;
use crate::asset::AssetRef;
use crate::block::{Block, BlockKind, MediaKind, MediaSource, RichText, plain_text};
use crate::config::FrontMatterFormat;
use crate::types::{PageMeta, PageRecord};

pub use embed::Provider;
pub use front_matter::FrontMatter;

/// Default callout icon.
const CALLOUT_ICON: &str = "💡";

/// One piece of converted output.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// Index into [`Fragment::assets`].
    Asset(usize),
}

/// Converted text with unresolved asset placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    segments: Vec<Segment>,
    assets: Vec<AssetRef>,
}

impl Fragment {
    /// Unique assets in first-seen order.
    pub fn assets(&self) -> &[AssetRef] {
        &self.assets
    }

    /// Whether nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Substitute every placeholder with `resolve(asset)`.
    pub fn render(&self, resolve: impl Fn(&AssetRef) -> String) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Asset(idx) => {
                    if let Some(asset) = self.assets.get(*idx) {
                        out.push_str(&resolve(asset));
                    }
                },
            }
        }
        out
    }
}

/// A block the converter did not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    /// Id of the offending block.
    pub block_id: String,
    /// Its remote type tag.
    pub type_tag: String,
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported block type '{}' ({})",
            self.type_tag, self.block_id
        )
    }
}

/// Result of converting a block forest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    /// Document body.
    pub body: Fragment,
    /// Blocks that fell back to plain text.
    pub warnings: Vec<ConversionWarning>,
    /// The body contains math.
    pub has_math: bool,
}

/// A converted page: header fields, optional cover, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    meta: PageMeta,
    format: FrontMatterFormat,
    cover: Option<AssetRef>,
    conversion: Conversion,
}

impl PageDocument {
    /// Every asset the document needs, cover first, without duplicates.
    pub fn assets(&self) -> Vec<&AssetRef> {
        let mut out: Vec<&AssetRef> = Vec::new();
        for asset in self.cover.iter().chain(self.conversion.body.assets()) {
            if !out.iter().any(|seen| seen.key == asset.key) {
                out.push(asset);
            }
        }
        out
    }

    /// Warnings raised while converting the body.
    pub fn warnings(&self) -> &[ConversionWarning] {
        &self.conversion.warnings
    }

    /// Full document text with assets resolved through `resolve`.
    pub fn render(&self, resolve: impl Fn(&AssetRef) -> String) -> Result<String> {
        let mut header = FrontMatter::from_meta(&self.meta, self.conversion.has_math);
        header.cover = self.cover.as_ref().map(&resolve);
        let mut out = header.render(self.format)?;
        let body = self.conversion.body.render(&resolve);
        if !body.is_empty() {
            out.push('\n');
            out.push_str(&body);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Stateless block converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Converter {
    front_matter: FrontMatterFormat,
}

impl Converter {
    /// Converter emitting YAML headers.
    pub const fn new() -> Self {
        Self {
            front_matter: FrontMatterFormat::Yaml,
        }
    }

    /// Use `format` for document headers.
    #[must_use]
    pub const fn with_front_matter(mut self, format: FrontMatterFormat) -> Self {
        self.front_matter = format;
        self
    }

    /// Convert a block forest into a body fragment.
    pub fn convert(&self, blocks: &[Block]) -> Conversion {
        let mut ctx = Context::new();
        ctx.blocks(blocks);
        let conversion = ctx.finish();
        for warning in &conversion.warnings {
            warn!(
                block_id = %warning.block_id,
                block_type = %warning.type_tag,
                "Unsupported block type, falling back to plain text"
            );
        }
        conversion
    }

    /// Convert a page and its blocks into a document.
    pub fn convert_page(&self, page: &PageRecord, blocks: &[Block]) -> PageDocument {
        let cover = page
            .meta
            .cover
            .as_ref()
            .map(|source| AssetRef::new(source, MediaKind::Image));
        PageDocument {
            meta: page.meta.clone(),
            format: self.front_matter,
            cover,
            conversion: self.convert(blocks),
        }
    }
}

/// List flavour of the previous sibling, for tight list rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bulleted,
    Numbered,
    ToDo,
}

/// Mutable conversion state.
#[derive(Debug, Default)]
struct Context {
    segments: Vec<Segment>,
    buf: String,
    assets: Vec<AssetRef>,
    asset_index: HashMap<String, usize>,
    indent: Vec<&'static str>,
    at_line_start: bool,
    wrote_block: bool,
    prev_list: Option<ListKind>,
    warnings: Vec<ConversionWarning>,
    has_math: bool,
}

impl Context {
    fn new() -> Self {
        Self {
            at_line_start: true,
            ..Self::default()
        }
    }

    fn finish(mut self) -> Conversion {
        self.flush_text();
        Conversion {
            body: Fragment {
                segments: self.segments,
                assets: self.assets,
            },
            warnings: self.warnings,
            has_math: self.has_math,
        }
    }

    // ---- low-level writing --------------------------------------------

    fn prefix(&self) -> String {
        self.indent.concat()
    }

    fn start_line(&mut self) {
        if self.at_line_start {
            let prefix = self.prefix();
            self.buf.push_str(&prefix);
            self.at_line_start = false;
        }
    }

    fn newline(&mut self) {
        if self.at_line_start {
            let prefix = self.prefix();
            self.buf.push_str(prefix.trim_end());
        }
        self.buf.push('\n');
        self.at_line_start = true;
    }

    fn write(&mut self, text: &str) {
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.newline();
            }
            if !line.is_empty() {
                self.start_line();
                self.buf.push_str(line);
            }
        }
    }

    fn flush_text(&mut self) {
        if !self.buf.is_empty() {
            self.segments.push(Segment::Text(std::mem::take(&mut self.buf)));
        }
    }

    fn asset(&mut self, asset: AssetRef) {
        self.start_line();
        self.flush_text();
        let next = self.assets.len();
        let idx = *self.asset_index.entry(asset.key.clone()).or_insert(next);
        if idx == next {
            self.assets.push(asset);
        }
        self.segments.push(Segment::Asset(idx));
    }

    /// Separate a new block from the previous sibling.
    fn begin_block(&mut self, list: Option<ListKind>) {
        if self.wrote_block {
            let tight = list.is_some() && list == self.prev_list;
            self.write(if tight { "\n" } else { "\n\n" });
        }
        self.wrote_block = true;
        self.prev_list = list;
    }

    /// Convert `children` as a nested container under `prefix`.
    fn nested(&mut self, prefix: &'static str, children: &[Block]) {
        if children.is_empty() {
            return;
        }
        self.indent.push(prefix);
        let prev_list = self.prev_list.take();
        self.blocks(children);
        self.prev_list = prev_list;
        self.indent.pop();
    }

    /// Run `f` inside a container whose first block starts fresh.
    fn container(&mut self, prefix: &'static str, f: impl FnOnce(&mut Self)) {
        self.indent.push(prefix);
        let wrote = std::mem::replace(&mut self.wrote_block, false);
        let prev_list = self.prev_list.take();
        f(self);
        self.wrote_block = wrote || self.wrote_block;
        self.prev_list = prev_list;
        self.indent.pop();
    }

    // ---- producers ----------------------------------------------------

    fn blocks(&mut self, blocks: &[Block]) {
        for block in blocks {
            self.block(block);
        }
    }

    fn block(&mut self, block: &Block) {
        if rich_text::has_math(block.kind.text()) {
            self.has_math = true;
        }

        match &block.kind {
            BlockKind::Paragraph { text } => {
                let rendered = rich_text::render(text);
                if !rendered.trim().is_empty() {
                    self.begin_block(None);
                    self.write(&rendered);
                }
                self.blocks(&block.children);
            },
            BlockKind::Heading { level, text } => {
                let level = usize::from((*level).clamp(1, 6));
                self.begin_block(None);
                self.write(&format!("{} {}", "#".repeat(level), rich_text::render(text)));
                self.blocks(&block.children);
            },
            BlockKind::BulletedListItem { text } => {
                self.list_item(ListKind::Bulleted, "- ", "  ", text, &block.children);
            },
            BlockKind::NumberedListItem { text } => {
                self.list_item(ListKind::Numbered, "1. ", "   ", text, &block.children);
            },
            BlockKind::ToDo { text, checked } => {
                let marker = if *checked { "- [x] " } else { "- [ ] " };
                self.list_item(ListKind::ToDo, marker, "  ", text, &block.children);
            },
            BlockKind::Code {
                text,
                language,
                caption,
            } => self.code(&plain_text(text), language, caption),
            BlockKind::Quote { text } => {
                self.begin_block(None);
                let rendered = rich_text::render(text);
                self.container("> ", |ctx| {
                    ctx.wrote_block = true;
                    ctx.write(&rendered);
                    ctx.blocks(&block.children);
                });
            },
            BlockKind::Callout { text, icon } => {
                self.begin_block(None);
                let icon = icon.as_deref().unwrap_or(CALLOUT_ICON);
                let rendered = format!("{icon} {}", rich_text::render(text));
                self.container("> ", |ctx| {
                    ctx.wrote_block = true;
                    ctx.write(&rendered);
                    ctx.blocks(&block.children);
                });
            },
            BlockKind::Toggle { text } => {
                self.begin_block(None);
                self.write(&format!(
                    "<details>\n<summary>{}</summary>",
                    rich_text::render(text)
                ));
                self.nested("", &block.children);
                self.write("\n\n</details>");
            },
            BlockKind::Divider => {
                self.begin_block(None);
                self.write("---");
            },
            BlockKind::Table { has_column_header } => {
                self.table(*has_column_header, &block.children);
            },
            BlockKind::TableRow { cells } => {
                // a row outside a table renders as a one-row table
                self.begin_block(None);
                self.write(&table_row(cells, cells.len()));
            },
            BlockKind::Embed { url, caption } => {
                self.begin_block(None);
                self.write(&embed::render_embed(url));
                self.caption(caption);
            },
            BlockKind::Bookmark { url, caption } => {
                let label = plain_text(caption);
                let label = if label.trim().is_empty() { url.as_str() } else { label.trim() };
                self.begin_block(None);
                self.write(&format!("[{}]({url})", escape_link_text(label)));
            },
            BlockKind::Equation { expression } => {
                self.has_math = true;
                self.begin_block(None);
                self.write(&format!("$$\n{}\n$$", expression.trim()));
            },
            BlockKind::Media {
                kind,
                source,
                caption,
            } => {
                self.begin_block(None);
                self.media(*kind, source, caption);
            },
            BlockKind::Unsupported {
                type_tag,
                plain_text,
            } => {
                self.warnings.push(ConversionWarning {
                    block_id: block.id.clone(),
                    type_tag: type_tag.clone(),
                });
                self.begin_block(None);
                if plain_text.trim().is_empty() {
                    self.write(&format!("<!-- unsupported block: {type_tag} -->"));
                } else {
                    self.write(plain_text.trim());
                }
                // container-like unknown types (columns, synced blocks) keep their content
                self.blocks(&block.children);
            },
        }
    }

    fn list_item(
        &mut self,
        kind: ListKind,
        marker: &str,
        child_indent: &'static str,
        text: &[RichText],
        children: &[Block],
    ) {
        self.begin_block(Some(kind));
        self.write(&format!("{marker}{}", rich_text::render(text)));
        self.nested(child_indent, children);
        // an item with children breaks tightness for the next sibling
        if !children.is_empty() {
            self.prev_list = None;
        }
    }

    fn code(&mut self, code: &str, language: &str, caption: &[RichText]) {
        let fence = if code.contains("```") { "````" } else { "```" };
        self.begin_block(None);
        self.write(&format!(
            "{fence}{}\n{code}\n{fence}",
            code_language(language)
        ));
        self.caption(caption);
    }

    fn caption(&mut self, caption: &[RichText]) {
        let text = rich_text::render(caption);
        if !text.trim().is_empty() {
            self.write(&format!("\n\n*{}*", text.trim()));
        }
    }

    fn table(&mut self, has_header: bool, rows: &[Block]) {
        let rows: Vec<&Vec<Vec<RichText>>> = rows
            .iter()
            .filter_map(|row| match &row.kind {
                BlockKind::TableRow { cells } => Some(cells),
                _ => None,
            })
            .collect();
        let Some(width) = rows.iter().map(|cells| cells.len()).max() else {
            return;
        };
        if width == 0 {
            return;
        }

        let mut lines = Vec::with_capacity(rows.len() + 2);
        let mut body = rows.as_slice();
        if has_header {
            if let Some((first, rest)) = rows.split_first() {
                lines.push(table_row(first, width));
                body = rest;
            }
        } else {
            lines.push(format!("|{}", " |".repeat(width)));
        }
        lines.push(format!("|{}", " --- |".repeat(width)));
        lines.extend(body.iter().map(|cells| table_row(cells, width)));

        self.begin_block(None);
        self.write(&lines.join("\n"));
    }

    fn media(&mut self, kind: MediaKind, source: &MediaSource, caption: &[RichText]) {
        let caption = plain_text(caption);
        let caption = caption.trim();
        match (kind, source) {
            (MediaKind::Image, _) => {
                self.write(&format!("![{}](", escape_link_text(caption)));
                self.asset(AssetRef::new(source, kind));
                self.write(")");
            },
            (MediaKind::Video, MediaSource::External(url)) => {
                self.write(&embed::render_external_video(url));
            },
            (MediaKind::Audio, MediaSource::External(url)) => {
                self.write(&format!(
                    "<audio src=\"{}\" controls></audio>",
                    encode_double_quoted_attribute(url)
                ));
            },
            (MediaKind::Pdf, MediaSource::External(url)) => {
                self.write(&embed::iframe(url, "600px"));
            },
            (MediaKind::File, MediaSource::External(url)) => {
                let name = file_label(caption, url);
                self.write(&format!("[{}]({url})", escape_link_text(&name)));
            },
            (MediaKind::Video, MediaSource::Hosted(_)) => {
                self.write("<video src=\"");
                self.asset(AssetRef::new(source, kind));
                self.write("\" controls></video>");
            },
            (MediaKind::Audio, MediaSource::Hosted(_)) => {
                self.write("<audio src=\"");
                self.asset(AssetRef::new(source, kind));
                self.write("\" controls></audio>");
            },
            (MediaKind::Pdf, MediaSource::Hosted(_)) => {
                self.write("<iframe src=\"");
                self.asset(AssetRef::new(source, kind));
                self.write("\" style=\"width:100%; height:600px;\"></iframe>");
            },
            (MediaKind::File, MediaSource::Hosted(url)) => {
                let name = file_label(caption, url);
                self.write(&format!("[{}](", escape_link_text(&name)));
                self.asset(AssetRef::new(source, kind));
                self.write(")");
            },
        }
    }
}

fn table_row(cells: &[Vec<RichText>], width: usize) -> String {
    let mut line = String::from("|");
    for i in 0..width {
        let cell = cells
            .get(i)
            .map(|runs| rich_text::render(runs))
            .unwrap_or_default();
        let cell = cell.replace('|', "\\|").replace('\n', "<br>");
        line.push(' ');
        line.push_str(cell.trim());
        line.push_str(" |");
    }
    line
}

/// Fence info string for a remote language name.
fn code_language(language: &str) -> String {
    let lower = language.trim().to_lowercase();
    match lower.as_str() {
        "plain text" => "text".to_string(),
        "c++" => "cpp".to_string(),
        "c#" => "csharp".to_string(),
        "f#" => "fsharp".to_string(),
        "objective-c" => "objectivec".to_string(),
        _ => lower.replace(' ', "-"),
    }
}

fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// Caption, else the last path segment of `url`, else `"file"`.
fn file_label(caption: &str, url: &str) -> String {
    if !caption.is_empty() {
        return caption.to_string();
    }
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("file")
        .to_string()
}
