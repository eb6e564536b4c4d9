//! Reference aggregation: collection path + document text -> reference set.
//!
//! The pipeline runs in a fixed order: resolve the collection path, export
//! the collection, then validate the document's citation markers against the
//! exported keys. Attachments are fetched afterwards and only for the keys
//! that are actually displayed.

pub mod frontmatter;
mod session;
mod view;

pub use session::{DocumentEvent, ReferenceSession, RefreshToken, ViewModelCache};
pub use view::view_state;

use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::citations;
use crate::config::Config;
use crate::library::{
    AttachmentFetcher, CollectionExporter, CollectionPathResolver, ExportFormat, LibraryCache,
    LibraryError,
};
use crate::models::{
    BibliographicItem, CitationKey, CollectionPath, ItemView, ReferenceSet, ViewMode,
};
use crate::rpc::RpcChannel;

/// A citation-key completion candidate
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Suggestion {
    pub citekey: CitationKey,
    pub title: String,
}

/// Orchestrates resolver, exporter, extractor and attachment lookups
#[derive(Debug, Clone)]
pub struct ReferenceAggregator {
    resolver: CollectionPathResolver,
    exporter: CollectionExporter,
    attachments: AttachmentFetcher,
    format: ExportFormat,
    attachment_concurrency: usize,
}

impl ReferenceAggregator {
    pub fn new(
        resolver: CollectionPathResolver,
        exporter: CollectionExporter,
        attachments: AttachmentFetcher,
    ) -> Self {
        Self {
            resolver,
            exporter,
            attachments,
            format: ExportFormat::default(),
            attachment_concurrency: 4,
        }
    }

    /// Wire every component to `channel` using `config`.
    ///
    /// The library snapshot cache is shared through the returned resolver; pass
    /// the same `library_cache` to a session so refreshes can invalidate it.
    pub fn from_config(
        channel: Arc<dyn RpcChannel>,
        config: &Config,
        library_cache: Arc<LibraryCache>,
    ) -> Self {
        let resolver = CollectionPathResolver::new(Arc::clone(&channel))
            .with_policy(config.resolver.ambiguity)
            .with_cache(library_cache);
        let exporter = CollectionExporter::new(Arc::clone(&channel), &config.service.export_path);
        let attachments = AttachmentFetcher::new(channel);

        Self::new(resolver, exporter, attachments)
            .with_export_format(config.references.export_format)
            .with_attachment_concurrency(config.references.attachment_concurrency)
    }

    pub fn with_export_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_attachment_concurrency(mut self, concurrency: usize) -> Self {
        self.attachment_concurrency = concurrency.max(1);
        self
    }

    pub fn resolver(&self) -> &CollectionPathResolver {
        &self.resolver
    }

    pub fn exporter(&self) -> &CollectionExporter {
        &self.exporter
    }

    /// Build the reference set of one document.
    ///
    /// Never fails: any error lands in `ReferenceSet::error` with every other
    /// field empty.
    pub async fn build_reference_set(&self, path: &CollectionPath, text: &str) -> ReferenceSet {
        match self.try_build(path, text).await {
            Ok(references) => references,
            Err(err) => {
                tracing::warn!(%path, error = %err, "reference aggregation failed");
                ReferenceSet::failed((&err).into())
            }
        }
    }

    /// Like [`build_reference_set`](Self::build_reference_set), but a document
    /// without a collection path is the valid empty state, not an error.
    pub async fn build_for_document(
        &self,
        path: Option<&CollectionPath>,
        text: &str,
    ) -> ReferenceSet {
        match path {
            Some(path) => self.build_reference_set(path, text).await,
            None => ReferenceSet::empty(),
        }
    }

    async fn try_build(
        &self,
        path: &CollectionPath,
        text: &str,
    ) -> Result<ReferenceSet, LibraryError> {
        let resolved = self.resolver.resolve(path).await?;
        let raw_items = self.exporter.export_items(&resolved, self.format).await?;

        let mut bibliography = Vec::with_capacity(raw_items.len());
        let mut items_by_id = BTreeMap::new();
        for raw in &raw_items {
            let item = BibliographicItem::from_raw(raw).map_err(LibraryError::MalformedResponse)?;
            if items_by_id.contains_key(&item.id) {
                continue;
            }
            bibliography.push(item.id.clone());
            items_by_id.insert(item.id.clone(), item);
        }

        // Validity is defined by the export, so extraction must come after it.
        let valid: HashSet<CitationKey> = bibliography.iter().cloned().collect();
        let citations = citations::extract(text, &valid);

        tracing::info!(
            %path,
            citations = citations.len(),
            bibliography = bibliography.len(),
            "built reference set"
        );

        Ok(ReferenceSet {
            library: Some(path.library().to_string()),
            library_id: Some(resolved.library_id),
            citations,
            bibliography,
            items_by_id,
            error: None,
        })
    }

    /// Item views for the keys shown in `mode`, with attachments.
    ///
    /// Attachment requests run with bounded concurrency; an item whose lookup
    /// fails is still shown, without link or annotations. A set without a
    /// resolved library has nothing to look attachments up in.
    pub async fn item_views(&self, references: &ReferenceSet, mode: ViewMode) -> Vec<ItemView> {
        let keys = references.keys_for(mode);

        let fetched: HashMap<&str, _> = match references.library_id {
            Some(library_id) => {
                let lookups: Vec<_> = keys
                    .iter()
                    .map(|key| async move {
                        let attachments =
                            match self.attachments.fetch_attachments(key, library_id).await {
                                Ok(attachments) => attachments,
                                Err(err) => {
                                    tracing::warn!(key = %key, error = %err, "attachment lookup failed");
                                    Vec::new()
                                }
                            };
                        (key.as_str(), attachments)
                    })
                    .collect();
                stream::iter(lookups)
                    .buffer_unordered(self.attachment_concurrency)
                    .collect()
                    .await
            }
            None => HashMap::new(),
        };

        keys.iter()
            .filter_map(|key| {
                let item = references.items_by_id.get(key)?;
                let attachments = fetched.get(key.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                Some(ItemView::from_item(item, attachments))
            })
            .collect()
    }

    /// Citation keys of the collection starting with `query`, in export order
    pub async fn suggest(
        &self,
        path: &CollectionPath,
        query: &str,
    ) -> Result<Vec<Suggestion>, LibraryError> {
        let resolved = self.resolver.resolve(path).await?;
        let raw_items = self.exporter.export_items(&resolved, self.format).await?;

        let mut seen = HashSet::new();
        Ok(raw_items
            .iter()
            .filter_map(|raw| BibliographicItem::from_raw(raw).ok())
            .filter(|item| item.id.starts_with(query))
            .filter(|item| seen.insert(item.id.clone()))
            .map(|item| Suggestion {
                citekey: item.id,
                title: item.title,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use crate::rpc::{MockChannel, RpcError};
    use serde_json::{json, Value};
    use std::time::Duration;

    const EXPORT: &str = "/better-bibtex/collection?/1/B.json";

    fn mock_library(mock: &MockChannel) {
        mock.on_call(
            "user.groups",
            Ok(json!([{
                "id": 1,
                "name": "LibX",
                "collections": [
                    {"key": "A", "name": "A", "parentCollection": false},
                    {"key": "B", "name": "B", "parentCollection": "A"}
                ]
            }])),
        );
        mock.on_fetch(
            EXPORT,
            Ok(json!([
                {"id": "k1", "title": "First", "container-title": "J1", "issued": {"date-parts": [[2020]]}},
                {"id": "k2", "title": "Second", "container-title": "J2", "issued": {"literal": "2019 draft"}},
                {"id": "k1", "title": "First again"}
            ])
            .to_string()),
        );
    }

    fn aggregator(mock: Arc<MockChannel>) -> ReferenceAggregator {
        let config = Config::default();
        ReferenceAggregator::from_config(
            mock,
            &config,
            Arc::new(LibraryCache::new(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_nested_collection_scenario() {
        let mock = Arc::new(MockChannel::new());
        mock_library(&mock);

        let set = aggregator(mock)
            .build_reference_set(&CollectionPath::from("LibX/A/B"), "see [@k1]")
            .await;

        assert!(set.error.is_none());
        assert_eq!(set.library.as_deref(), Some("LibX"));
        assert_eq!(set.citations, vec!["k1"]);
        assert_eq!(set.bibliography, vec!["k1", "k2"]);
        assert_eq!(set.items_by_id["k1"].title, "First");
    }

    #[tokio::test]
    async fn test_idempotent() {
        let mock = Arc::new(MockChannel::new());
        mock_library(&mock);
        let aggregator = aggregator(mock);
        let path = CollectionPath::from("LibX/A/B");
        let text = "[@k2; @k1] then [@k2] and [@unknown]";

        let first = aggregator.build_reference_set(&path, text).await;
        let second = aggregator.build_reference_set(&path, text).await;

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.citations, vec!["k2", "k1"]);
    }

    #[tokio::test]
    async fn test_path_not_found_becomes_error_field() {
        let mock = Arc::new(MockChannel::new());
        mock.on_call(
            "user.groups",
            Ok(json!([{
                "id": 1,
                "name": "LibX",
                "collections": [{"key": "R", "name": "RealTop", "parentCollection": false}]
            }])),
        );

        let set = aggregator(mock)
            .build_reference_set(&CollectionPath::from("LibX/NoSuchTop"), "[@k1]")
            .await;

        assert_eq!(set.error.unwrap().kind, ErrorKind::PathNotFound);
        assert!(set.citations.is_empty());
        assert!(set.bibliography.is_empty());
    }

    #[tokio::test]
    async fn test_service_down() {
        let mock = Arc::new(MockChannel::new());
        mock.fail_all(RpcError::Unreachable("connection refused".to_string()));

        let set = aggregator(mock)
            .build_reference_set(&CollectionPath::from("LibX/A"), "[@k1]")
            .await;

        assert!(set.library.is_none());
        assert!(set.citations.is_empty());
        assert!(set.bibliography.is_empty());
        assert!(set.items_by_id.is_empty());
        assert_eq!(set.error.unwrap().kind, ErrorKind::ServiceUnreachable);
    }

    #[tokio::test]
    async fn test_no_collection_is_not_an_error() {
        let mock = Arc::new(MockChannel::new());
        let set = aggregator(mock.clone())
            .build_for_document(None, "[@k1]")
            .await;

        assert_eq!(set, ReferenceSet::empty());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_attachments_fetched_only_for_displayed_keys() {
        let mock = Arc::new(MockChannel::new());
        mock_library(&mock);
        mock.on_call("item.attachments", Ok(json!([])));
        mock.on_call_with(
            "item.attachments",
            "k1",
            Ok(json!([{
                "open": "zotero://open-pdf/library/items/P1",
                "path": "/tmp/p1.pdf",
                "annotations": [{"key": "H", "annotationType": "highlight", "annotationText": "x"}]
            }])),
        );

        let aggregator = aggregator(mock.clone());
        let set = aggregator
            .build_reference_set(&CollectionPath::from("LibX/A/B"), "[@k1]")
            .await;

        let views = aggregator.item_views(&set, ViewMode::References).await;
        assert_eq!(views.len(), 1);
        assert_eq!(mock.call_count("item.attachments"), 1);
        assert_eq!(
            views[0].open_link.as_deref(),
            Some("zotero://open-pdf/library/items/P1")
        );
        assert_eq!(views[0].annotations.len(), 1);
        assert_eq!(views[0].year, "2020");

        let views = aggregator.item_views(&set, ViewMode::Bibliography).await;
        let keys: Vec<_> = views.iter().map(|v| v.citekey.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k2"]);
        assert_eq!(views[1].year, "2019");
        assert!(views[1].open_link.is_none());
        assert_eq!(mock.call_count("item.attachments"), 3);
    }

    #[tokio::test]
    async fn test_attachment_failure_keeps_item() {
        let mock = Arc::new(MockChannel::new());
        mock_library(&mock);
        mock.on_call(
            "item.attachments",
            Err(RpcError::Malformed("bad".to_string())),
        );

        let aggregator = aggregator(mock);
        let set = aggregator
            .build_reference_set(&CollectionPath::from("LibX/A/B"), "[@k1; @k2]")
            .await;
        let views = aggregator.item_views(&set, ViewMode::References).await;

        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.open_link.is_none()));
    }

    #[tokio::test]
    async fn test_attachments_scoped_to_group_library() {
        let mock = Arc::new(MockChannel::new());
        mock.on_call(
            "user.groups",
            Ok(json!([
                {"id": 1, "name": "My Library", "collections": []},
                {
                    "id": 7,
                    "name": "Lab",
                    "collections": [{"key": "G", "name": "G", "parentCollection": false}]
                }
            ])),
        );
        mock.on_fetch(
            "/better-bibtex/collection?/7/G.json",
            Ok(json!([{"id": "g1", "title": "Group paper"}]).to_string()),
        );
        mock.on_call("item.attachments", Ok(json!([])));

        let aggregator = aggregator(mock.clone());
        let set = aggregator
            .build_reference_set(&CollectionPath::from("Lab/G"), "[@g1]")
            .await;
        assert_eq!(set.library_id, Some(7));

        let views = aggregator.item_views(&set, ViewMode::References).await;
        assert_eq!(views.len(), 1);

        let params: Vec<_> = mock
            .calls()
            .into_iter()
            .filter(|(method, _)| method == "item.attachments")
            .map(|(_, params)| params)
            .collect();
        assert_eq!(params, vec![json!(["g1", 7])]);
    }

    #[tokio::test]
    async fn test_no_attachment_lookup_without_library() {
        let mock = Arc::new(MockChannel::new());
        let set = ReferenceSet {
            citations: vec!["k1".to_string()],
            ..ReferenceSet::default()
        };

        let views = aggregator(mock.clone())
            .item_views(&set, ViewMode::References)
            .await;

        assert!(views.is_empty());
        assert_eq!(mock.call_count("item.attachments"), 0);
    }

    #[tokio::test]
    async fn test_attachment_fan_out_is_bounded() {
        let keys = ["a1", "a2", "a3", "a4", "a5"];
        let mock = Arc::new(MockChannel::new());
        mock.on_call(
            "user.groups",
            Ok(json!([{
                "id": 1,
                "name": "LibX",
                "collections": [{"key": "A", "name": "A", "parentCollection": false}]
            }])),
        );
        let items: Vec<_> = keys
            .iter()
            .map(|key| json!({"id": key, "title": key.to_uppercase()}))
            .collect();
        mock.on_fetch(
            "/better-bibtex/collection?/1/A.json",
            Ok(Value::Array(items).to_string()),
        );
        for (key, delay) in keys.iter().zip([60, 10, 40, 5, 25]) {
            mock.on_call_with(
                "item.attachments",
                key,
                Ok(json!([{
                    "open": format!("zotero://open-pdf/library/items/{}", key),
                    "path": format!("/tmp/{}.pdf", key)
                }])),
            );
            mock.push_latency("item.attachments", Duration::from_millis(delay));
        }

        let aggregator = aggregator(mock.clone()).with_attachment_concurrency(2);
        let set = aggregator
            .build_reference_set(&CollectionPath::from("LibX/A"), "")
            .await;
        let views = aggregator.item_views(&set, ViewMode::Bibliography).await;

        assert_eq!(mock.call_count("item.attachments"), 5);
        assert_eq!(mock.max_in_flight("item.attachments"), 2);

        let shown: Vec<_> = views.iter().map(|v| v.citekey.as_str()).collect();
        assert_eq!(shown, keys);
        for view in &views {
            assert_eq!(
                view.open_link,
                Some(format!("zotero://open-pdf/library/items/{}", view.citekey))
            );
            assert_eq!(view.title, view.citekey.to_uppercase());
        }
    }

    #[tokio::test]
    async fn test_suggest() {
        let mock = Arc::new(MockChannel::new());
        mock_library(&mock);

        let suggestions = aggregator(mock)
            .suggest(&CollectionPath::from("LibX/A/B"), "k")
            .await
            .unwrap();

        assert_eq!(
            suggestions,
            vec![
                Suggestion {
                    citekey: "k1".to_string(),
                    title: "First".to_string()
                },
                Suggestion {
                    citekey: "k2".to_string(),
                    title: "Second".to_string()
                },
            ]
        );
    }
}
