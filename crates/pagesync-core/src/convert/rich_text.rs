//! Rich-text runs to inline Markdown.

use html_escape::encode_double_quoted_attribute;

use crate::block::RichText;

/// Render a sequence of runs as inline Markdown.
pub fn render(runs: &[RichText]) -> String {
    runs.iter().map(render_run).collect()
}

fn render_run(run: &RichText) -> String {
    if run.equation {
        return format!("${}$", run.plain_text.trim());
    }

    let ann = &run.annotations;
    let mut text = run.plain_text.clone();

    if ann.code {
        text = wrap(&text, "`", "`");
    }
    if ann.bold {
        text = wrap(&text, "**", "**");
    }
    if ann.italic {
        text = wrap(&text, "*", "*");
    }
    if ann.strikethrough {
        text = wrap(&text, "~~", "~~");
    }
    if ann.underline {
        text = wrap(&text, "<u>", "</u>");
    }
    if let Some(href) = run.href.as_deref().filter(|h| !h.is_empty()) {
        text = wrap(&text, "[", &format!("]({href})"));
    }
    if ann.has_color() {
        let style = color_style(&ann.color);
        text = wrap(
            &text,
            &format!("<span style=\"{}\">", encode_double_quoted_attribute(&style)),
            "</span>",
        );
    }
    text
}

/// Wrap the non-whitespace core of `text`; surrounding whitespace stays
/// outside the markers so emphasis still parses.
fn wrap(text: &str, open: &str, close: &str) -> String {
    let core = text.trim();
    if core.is_empty() {
        return text.to_string();
    }
    let start = text.len() - text.trim_start().len();
    let end = start + core.len();
    format!("{}{open}{core}{close}{}", &text[..start], &text[end..])
}

/// `red` becomes `color: red`; `red_background` becomes `background-color: red`.
fn color_style(color: &str) -> String {
    color.strip_suffix("_background").map_or_else(
        || format!("color: {color}"),
        |base| format!("background-color: {base}"),
    )
}

/// Whether the runs contain inline math or TeX delimiters.
pub fn has_math(runs: &[RichText]) -> bool {
    runs.iter().any(|run| {
        run.equation
            || run.plain_text.contains('$')
            || run.plain_text.contains("\\(")
            || run.plain_text.contains("\\[")
    })
}
