//! Attachment and annotation lookup for a single item.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::LibraryError;
use crate::models::{AnnotationKind, AnnotationRecord, AttachmentRecord, LibraryId};
use crate::rpc::{methods, RpcChannel};

/// Attachment entry as returned by `item.attachments`
#[derive(Debug, Deserialize)]
struct WireAttachment {
    open: String,
    /// Local file path; `false` when the attachment has no file
    #[serde(default)]
    path: Value,
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnnotation {
    key: String,
    annotation_type: String,
    #[serde(default)]
    annotation_text: Option<String>,
    #[serde(default)]
    annotation_color: Option<String>,
    #[serde(default)]
    annotation_comment: Option<String>,
    #[serde(default)]
    annotation_image_path: Option<String>,
}

impl WireAttachment {
    fn has_file(&self) -> bool {
        self.path.as_str().is_some_and(|p| !p.is_empty())
    }
}

impl WireAnnotation {
    fn into_record(self) -> Option<AnnotationRecord> {
        let kind = match self.annotation_type.as_str() {
            "highlight" => AnnotationKind::Highlight {
                text: self.annotation_text.unwrap_or_default(),
                color: self.annotation_color.unwrap_or_default(),
            },
            "image" => AnnotationKind::Image {
                image_path: self.annotation_image_path?,
            },
            other => {
                tracing::debug!(key = %self.key, kind = other, "skipping annotation type");
                return None;
            }
        };

        Some(AnnotationRecord {
            key: self.key,
            comment: self.annotation_comment.unwrap_or_default(),
            kind,
        })
    }
}

/// Validate an `item.attachments` result, keeping only attachments with a file
pub fn parse_attachments(value: Value) -> Result<Vec<AttachmentRecord>, LibraryError> {
    let entries: Vec<WireAttachment> = serde_json::from_value(value)
        .map_err(|e| LibraryError::MalformedResponse(format!("item.attachments: {}", e)))?;

    Ok(entries
        .into_iter()
        .filter(WireAttachment::has_file)
        .map(|entry| AttachmentRecord {
            open_link: entry.open,
            annotations: entry
                .annotations
                .into_iter()
                .filter_map(WireAnnotation::into_record)
                .collect(),
        })
        .collect())
}

/// Fetches attachments for one citation key
#[derive(Debug, Clone)]
pub struct AttachmentFetcher {
    channel: Arc<dyn RpcChannel>,
}

impl AttachmentFetcher {
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self { channel }
    }

    /// Attachments of `key` in library `library_id` that have a local file,
    /// in service order
    pub async fn fetch_attachments(
        &self,
        key: &str,
        library_id: LibraryId,
    ) -> Result<Vec<AttachmentRecord>, LibraryError> {
        let result = self
            .channel
            .call(methods::ITEM_ATTACHMENTS, json!([key, library_id]))
            .await?;
        let attachments = parse_attachments(result)?;
        tracing::debug!(key, library_id, attachments = attachments.len(), "fetched attachments");
        Ok(attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockChannel;

    fn attachments_json() -> Value {
        json!([
            {
                "open": "zotero://open-pdf/library/items/NOFILE",
                "path": false,
                "annotations": []
            },
            {
                "open": "zotero://open-pdf/library/items/PDF1",
                "path": "/home/me/Zotero/storage/PDF1/paper.pdf",
                "annotations": [
                    {
                        "key": "H1",
                        "annotationType": "highlight",
                        "annotationText": "a key sentence",
                        "annotationColor": "#ffd400",
                        "annotationComment": "check this"
                    },
                    {
                        "key": "I1",
                        "annotationType": "image",
                        "annotationImagePath": "/home/me/Zotero/cache/I1.png"
                    },
                    {
                        "key": "N1",
                        "annotationType": "note",
                        "annotationComment": "a sticky note"
                    }
                ]
            }
        ])
    }

    #[test]
    fn test_parse_filters_missing_files_and_unknown_types() {
        let attachments = parse_attachments(attachments_json()).unwrap();
        assert_eq!(attachments.len(), 1);

        let attachment = &attachments[0];
        assert_eq!(attachment.open_link, "zotero://open-pdf/library/items/PDF1");
        assert_eq!(attachment.annotations.len(), 2);
        assert_eq!(attachment.annotations[0].comment, "check this");
        assert!(matches!(
            &attachment.annotations[1].kind,
            AnnotationKind::Image { image_path } if image_path.ends_with("I1.png")
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(parse_attachments(json!({"open": "x"})).is_err());
        assert!(parse_attachments(json!([{"path": "/x"}])).is_err());
        assert!(parse_attachments(json!([])).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_attachments() {
        let mock = Arc::new(MockChannel::new());
        mock.on_call_with("item.attachments", "smith2020", Ok(attachments_json()));

        let fetcher = AttachmentFetcher::new(mock.clone());
        let attachments = fetcher.fetch_attachments("smith2020", 7).await.unwrap();

        assert_eq!(attachments.len(), 1);
        assert_eq!(mock.calls()[0].1, json!(["smith2020", 7]));
    }
}
