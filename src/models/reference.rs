//! Aggregation results handed to the presentation layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::item::{AnnotationRecord, BibliographicItem, CitationKey};
use super::library::LibraryId;

/// Failure category carried inside a [`ReferenceSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ServiceUnreachable,
    MalformedResponse,
    ExportFailed,
    PathNotFound,
    AmbiguousName,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ServiceUnreachable => "service unreachable",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::ExportFailed => "export failed",
            ErrorKind::PathNotFound => "path not found",
            ErrorKind::AmbiguousName => "ambiguous name",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Citations and bibliography of one document, resolved against one collection.
///
/// Failed runs keep the same shape: empty collections plus `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSet {
    pub library: Option<String>,
    /// Library the collection resolved into; attachment lookups are scoped to it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<LibraryId>,
    /// Keys cited in the document, first-occurrence order
    pub citations: Vec<CitationKey>,
    /// Every key in the collection, export order
    pub bibliography: Vec<CitationKey>,
    pub items_by_id: BTreeMap<CitationKey, BibliographicItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReferenceError>,
}

impl ReferenceSet {
    /// The valid empty state for a document without a collection
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(error: ReferenceError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Keys rendered in the given mode
    pub fn keys_for(&self, mode: ViewMode) -> &[CitationKey] {
        match mode {
            ViewMode::References => &self.citations,
            ViewMode::Bibliography => &self.bibliography,
        }
    }
}

/// Which list the reference panel shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Only keys cited in the document
    #[default]
    References,
    /// The whole collection
    Bibliography,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::References => ViewMode::Bibliography,
            ViewMode::Bibliography => ViewMode::References,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::References => f.write_str("References"),
            ViewMode::Bibliography => f.write_str("Bibliography"),
        }
    }
}

/// Display row for one item, with its attachment data merged in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub citekey: CitationKey,
    pub title: String,
    pub journal: String,
    pub year: String,
    pub open_link: Option<String>,
    pub annotations: Vec<AnnotationRecord>,
}

/// What the panel should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum ViewState {
    Ready,
    NoCollectionConfigured,
    NoCitations,
    NoBibliography,
    Failed(ErrorKind),
}

impl ViewState {
    /// User-facing text for the non-ready states
    pub fn message(&self) -> &'static str {
        match self {
            ViewState::Ready => "",
            ViewState::NoCollectionConfigured => {
                "No Zotero collection is configured for the current document."
            }
            ViewState::NoCitations => "No citations found in the current document.",
            ViewState::NoBibliography => {
                "No bibliography entries found for the current document."
            }
            ViewState::Failed(ErrorKind::ServiceUnreachable) => {
                "Unable to connect to Zotero. Is Zotero running?"
            }
            ViewState::Failed(ErrorKind::PathNotFound) => {
                "The configured Zotero collection could not be found."
            }
            ViewState::Failed(ErrorKind::AmbiguousName) => {
                "The configured Zotero collection path is ambiguous."
            }
            ViewState::Failed(_) => "Zotero returned an unexpected response.",
        }
    }
}

/// The cached view model of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceView {
    pub mode: ViewMode,
    pub state: ViewState,
    pub references: ReferenceSet,
    pub items: Vec<ItemView>,
}

impl ReferenceView {
    pub fn unconfigured(mode: ViewMode) -> Self {
        Self {
            mode,
            state: ViewState::NoCollectionConfigured,
            references: ReferenceSet::empty(),
            items: Vec::new(),
        }
    }

    /// Items carrying at least one annotation
    pub fn annotated_items(&self) -> impl Iterator<Item = &ItemView> {
        self.items.iter().filter(|item| !item.annotations.is_empty())
    }
}
