//! View-model derivation from reference sets and attachments.

use crate::models::{
    AttachmentRecord, BibliographicItem, ItemView, ReferenceSet, ReferenceView, ViewMode,
    ViewState,
};

impl ItemView {
    /// Merge an item with its attachments.
    ///
    /// The first attachment is the canonical open link; annotations of all
    /// attachments are concatenated in attachment order.
    pub fn from_item(item: &BibliographicItem, attachments: &[AttachmentRecord]) -> Self {
        Self {
            citekey: item.id.clone(),
            title: item.title.clone(),
            journal: item.journal().to_string(),
            year: item.issued.year(),
            open_link: attachments.first().map(|a| a.open_link.clone()),
            annotations: attachments
                .iter()
                .flat_map(|a| a.annotations.iter().cloned())
                .collect(),
        }
    }

    /// `journal year`, as shown under the title
    pub fn venue_line(&self) -> String {
        match (self.journal.is_empty(), self.year.is_empty()) {
            (false, false) => format!("{} {}", self.journal, self.year),
            (false, true) => self.journal.clone(),
            (true, false) => self.year.clone(),
            (true, true) => String::new(),
        }
    }
}

/// Which state a finished reference set puts the panel in
pub fn view_state(references: &ReferenceSet, mode: ViewMode) -> ViewState {
    if let Some(error) = &references.error {
        return ViewState::Failed(error.kind);
    }

    match mode {
        ViewMode::References if references.citations.is_empty() => ViewState::NoCitations,
        ViewMode::Bibliography if references.bibliography.is_empty() => {
            ViewState::NoBibliography
        }
        _ => ViewState::Ready,
    }
}

impl ReferenceView {
    pub fn new(mode: ViewMode, references: ReferenceSet, items: Vec<ItemView>) -> Self {
        Self {
            mode,
            state: view_state(&references, mode),
            references,
            items,
        }
    }
}
