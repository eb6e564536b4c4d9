//! Terminal styling for the command-line output.

use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::models::{AnnotationKind, ItemView, ViewState};

/// Check if stdout is a terminal.
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Status types for colored output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
}

pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
    }
}

/// Print a styled status message to stderr.
pub fn print_status(status: Status, msg: &str) {
    let icon = status_icon(status);
    match status {
        Status::Success => eprintln!("{} {}", icon.green().bold(), msg),
        Status::Error => eprintln!("{} {}", icon.red().bold(), msg),
        Status::Warning => eprintln!("{} {}", icon.yellow().bold(), msg),
        Status::Info => eprintln!("{} {}", icon.cyan().bold(), msg),
    }
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", format!("━━━ {} ━━━", title).bold().cyan());
}

/// How a view state is reported; `None` for a view with entries to list.
///
/// An empty collection is reported as a warning since it usually means the
/// frontmatter points at the wrong collection.
pub fn view_state_status(state: ViewState) -> Option<Status> {
    match state {
        ViewState::Ready => None,
        ViewState::Failed(_) => Some(Status::Error),
        ViewState::NoBibliography => Some(Status::Warning),
        ViewState::NoCollectionConfigured | ViewState::NoCitations => Some(Status::Info),
    }
}

/// Status line for a view that has nothing to list
pub fn print_view_state(state: ViewState) {
    if let Some(status) = view_state_status(state) {
        print_status(status, state.message());
    }
}

/// Print one reference entry: title, venue and, optionally, its annotations.
pub fn print_item(item: &ItemView, with_annotations: bool) {
    println!("{} {}", item.citekey.yellow(), item.title.bold());

    let venue = item.venue_line();
    if !venue.is_empty() {
        println!("  {}", venue.dimmed());
    }
    if let Some(open) = &item.open_link {
        println!("  {}", open.blue());
    }

    if !with_annotations {
        return;
    }

    for annotation in &item.annotations {
        match &annotation.kind {
            AnnotationKind::Highlight { text, .. } => println!("  > {}", text.italic()),
            AnnotationKind::Image { image_path } => println!("  [image] {}", image_path),
        }
        if !annotation.comment.is_empty() {
            println!("    {}", annotation.comment.dimmed());
        }
        if let Some(open) = &item.open_link {
            println!("    {}", annotation.deep_link(open).dimmed());
        }
    }
}

/// Truncate text to at most `max_chars` characters, marking the cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return "...".to_string();
    }

    let truncated: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("a longer title", 8), "a lon...");
        assert_eq!(truncate_with_ellipsis("Übersicht über", 6), "Übe...");
        assert_eq!(truncate_with_ellipsis("abcdef", 2), "...");
    }

    #[test]
    fn test_view_state_status() {
        use crate::models::ErrorKind;

        assert_eq!(view_state_status(ViewState::Ready), None);
        assert_eq!(
            view_state_status(ViewState::Failed(ErrorKind::ServiceUnreachable)),
            Some(Status::Error)
        );
        assert_eq!(view_state_status(ViewState::NoBibliography), Some(Status::Warning));
        assert_eq!(view_state_status(ViewState::NoCitations), Some(Status::Info));
        assert_eq!(
            view_state_status(ViewState::NoCollectionConfigured),
            Some(Status::Info)
        );
    }

    #[test]
    fn test_status_icons() {
        assert_eq!(status_icon(Status::Success), "✓");
        assert_eq!(status_icon(Status::Error), "✗");
        assert_eq!(status_icon(Status::Warning), "⚠");
    }
}
