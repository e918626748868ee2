//! Progress bars for interactive runs.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use is_terminal::IsTerminal;
use pagesync_core::Verbosity;

/// Page progress bar, hidden unless stderr is a terminal at normal verbosity.
///
/// Verbose runs already log one line per page, so the bar would only
/// interleave with them.
pub fn page_bar(verbosity: Verbosity) -> ProgressBar {
    let visible = verbosity == Verbosity::Normal && std::io::stderr().is_terminal();
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Update `pb` after a page finished.
pub fn advance(pb: &ProgressBar, done: usize, total: usize, title: &str) {
    pb.set_length(total as u64);
    pb.set_position(done as u64);
    pb.set_message(truncate(title, 40));
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }

    #[test]
    fn test_hidden_bar_accepts_updates() {
        let pb = page_bar(Verbosity::Quiet);
        advance(&pb, 1, 3, "Page");
        assert_eq!(pb.position(), 1);
    }
}
