//! Per-document view model cache and the event loop feeding it.
//!
//! Every refresh trigger issues a [`RefreshToken`]. Runs may finish in any
//! order; only the run holding the newest token of its document may write the
//! cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{frontmatter, ReferenceAggregator};
use crate::library::LibraryCache;
use crate::models::{CollectionPath, ReferenceView, ViewMode};

/// Something that should rebuild the view of the active document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// The active document changed
    Opened {
        document: String,
        text: String,
        collection: Option<CollectionPath>,
    },
    /// Explicit user refresh of the active document.
    ///
    /// `text` carries the document's current content and replaces the one
    /// captured earlier, together with `collection`. Without it the view is
    /// rebuilt from the last captured content.
    Refresh {
        text: Option<String>,
        collection: Option<CollectionPath>,
    },
    SwitchMode(ViewMode),
    /// The document was closed; its cached view is dropped
    Closed { document: String },
}

impl DocumentEvent {
    /// An `Opened` event for a markdown document, reading the collection path
    /// from the frontmatter `field`
    pub fn opened_markdown(document: impl Into<String>, text: impl Into<String>, field: &str) -> Self {
        let text = text.into();
        let collection = frontmatter::collection_path(&text, field);
        DocumentEvent::Opened {
            document: document.into(),
            text,
            collection,
        }
    }

    /// A `Refresh` that rebuilds from the last captured content
    pub fn refresh() -> Self {
        DocumentEvent::Refresh {
            text: None,
            collection: None,
        }
    }

    /// A `Refresh` carrying the current markdown text of the active document
    pub fn refreshed_markdown(text: impl Into<String>, field: &str) -> Self {
        let text = text.into();
        let collection = frontmatter::collection_path(&text, field);
        DocumentEvent::Refresh {
            text: Some(text),
            collection,
        }
    }
}

/// Identifies one aggregation run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefreshToken {
    pub document: String,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    latest_issued: u64,
    view: Option<ReferenceView>,
}

/// Latest view model per document, written last-writer-by-generation
#[derive(Debug, Default)]
pub struct ViewModelCache {
    generation: AtomicU64,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ViewModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a run for `document`, superseding every earlier run
    pub fn begin(&self, document: &str) -> RefreshToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.slots()
            .entry(document.to_string())
            .or_default()
            .latest_issued = generation;

        RefreshToken {
            document: document.to_string(),
            generation,
        }
    }

    /// Whether no later run was started for the token's document
    pub fn is_current(&self, token: &RefreshToken) -> bool {
        self.slots()
            .get(&token.document)
            .is_some_and(|slot| slot.latest_issued == token.generation)
    }

    /// Store `view` if `token` is still current. Returns whether it was stored.
    ///
    /// Runs of a removed document are never current.
    pub fn commit(&self, token: &RefreshToken, view: ReferenceView) -> bool {
        let mut slots = self.slots();
        let slot = match slots.get_mut(&token.document) {
            Some(slot) if slot.latest_issued == token.generation => slot,
            other => {
                tracing::debug!(
                    document = %token.document,
                    generation = token.generation,
                    latest = ?other.map(|slot| slot.latest_issued),
                    "discarding superseded view model"
                );
                return false;
            }
        };

        slot.view = Some(view);
        true
    }

    pub fn get(&self, document: &str) -> Option<ReferenceView> {
        self.slots().get(document).and_then(|slot| slot.view.clone())
    }

    /// Drop the cached view of `document`; in-flight runs stay valid
    pub fn invalidate(&self, document: &str) {
        if let Some(slot) = self.slots().get_mut(document) {
            slot.view = None;
        }
    }

    /// Forget `document` entirely; its in-flight runs can no longer commit
    pub fn remove(&self, document: &str) {
        self.slots().remove(document);
    }

    /// Number of documents with a slot
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

#[derive(Debug, Clone)]
struct ActiveDocument {
    id: String,
    text: String,
    collection: Option<CollectionPath>,
}

#[derive(Debug, Default)]
struct SessionState {
    active: Option<ActiveDocument>,
    mode: ViewMode,
}

/// Turns document events into cached reference views
#[derive(Debug)]
pub struct ReferenceSession {
    aggregator: ReferenceAggregator,
    views: ViewModelCache,
    library_cache: Arc<LibraryCache>,
    state: Mutex<SessionState>,
}

impl ReferenceSession {
    /// `library_cache` should be the cache the aggregator's resolver uses
    pub fn new(aggregator: ReferenceAggregator, library_cache: Arc<LibraryCache>) -> Self {
        Self {
            aggregator,
            views: ViewModelCache::new(),
            library_cache,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn with_mode(self, mode: ViewMode) -> Self {
        self.state().mode = mode;
        self
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> ViewMode {
        self.state().mode
    }

    pub fn views(&self) -> &ViewModelCache {
        &self.views
    }

    /// Cached view of the active document
    pub fn current(&self) -> Option<ReferenceView> {
        let id = self.state().active.as_ref()?.id.clone();
        self.views.get(&id)
    }

    /// Apply `event` and rebuild the active document's view.
    ///
    /// Returns the new view, or `None` when there is no active document or a
    /// later event superseded this run.
    pub async fn handle(&self, event: DocumentEvent) -> Option<ReferenceView> {
        // The token is issued under the state lock so generations follow the
        // order in which events were applied.
        let (document, mode, token) = {
            let mut state = self.state();
            match event {
                DocumentEvent::Opened {
                    document,
                    text,
                    collection,
                } => {
                    state.active = Some(ActiveDocument {
                        id: document,
                        text,
                        collection,
                    });
                }
                DocumentEvent::Refresh { text, collection } => {
                    self.library_cache.invalidate();
                    if let Some(active) = &mut state.active {
                        if let Some(text) = text {
                            active.text = text;
                            active.collection = collection;
                        }
                        self.views.invalidate(&active.id);
                    }
                }
                DocumentEvent::SwitchMode(mode) => state.mode = mode,
                DocumentEvent::Closed { document } => {
                    self.views.remove(&document);
                    if state.active.as_ref().is_some_and(|a| a.id == document) {
                        state.active = None;
                    }
                    return None;
                }
            }
            let active = state.active.clone()?;
            let token = self.views.begin(&active.id);
            (active, state.mode, token)
        };

        let view = self.build(&document, mode).await;

        if self.views.commit(&token, view.clone()) {
            Some(view)
        } else {
            None
        }
    }

    async fn build(&self, document: &ActiveDocument, mode: ViewMode) -> ReferenceView {
        let Some(path) = &document.collection else {
            return ReferenceView::unconfigured(mode);
        };

        let references = self
            .aggregator
            .build_reference_set(path, &document.text)
            .await;
        let items = if references.is_error() {
            Vec::new()
        } else {
            self.aggregator.item_views(&references, mode).await
        };

        ReferenceView::new(mode, references, items)
    }
}
