//! Collection and item export.
//!
//! Collections are exported with a file-style GET
//! (`{export_path}?/{libraryId}/{collectionKey}.{format}`); arbitrary key
//! sets go through the `item.export` JSON-RPC method.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::LibraryError;
use crate::models::{LibraryId, RawItem, ResolvedCollection};
use crate::rpc::{methods, RpcChannel, RpcError};

/// Export translators understood by Better BibTeX
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    /// CSL-JSON array
    #[default]
    #[serde(rename = "json")]
    CslJson,
    /// Better BibTeX JSON, `{ "items": [...] }`
    #[serde(rename = "jzon")]
    BetterBibtexJson,
    #[serde(rename = "betterbibtex")]
    BetterBibtex,
    #[serde(rename = "biblatex")]
    BetterBiblatex,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::CslJson => "json",
            ExportFormat::BetterBibtexJson => "jzon",
            ExportFormat::BetterBibtex => "betterbibtex",
            ExportFormat::BetterBiblatex => "biblatex",
        }
    }

    /// Whether the export body is JSON that yields items
    pub fn is_json(&self) -> bool {
        matches!(self, ExportFormat::CslJson | ExportFormat::BetterBibtexJson)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" | "csl" | "csljson" => Ok(ExportFormat::CslJson),
            "jzon" => Ok(ExportFormat::BetterBibtexJson),
            "betterbibtex" | "bibtex" => Ok(ExportFormat::BetterBibtex),
            "biblatex" | "betterbiblatex" => Ok(ExportFormat::BetterBiblatex),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

/// Transport failures stay `ServiceUnreachable`; anything the service
/// answers but we cannot use is an export failure.
fn export_error(err: RpcError) -> LibraryError {
    match err {
        RpcError::Unreachable(_) | RpcError::Timeout | RpcError::Transport(_) => err.into(),
        other => LibraryError::ExportFailed(other.to_string()),
    }
}

/// Parse an export body into items
pub fn parse_items(body: &str, format: ExportFormat) -> Result<Vec<RawItem>, LibraryError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| LibraryError::ExportFailed(format!("{} export is not JSON: {}", format, e)))?;

    let items = match format {
        ExportFormat::BetterBibtexJson => value
            .get("items")
            .cloned()
            .ok_or_else(|| LibraryError::ExportFailed("jzon export has no 'items'".to_string()))?,
        _ => value,
    };

    serde_json::from_value::<Vec<RawItem>>(items)
        .map_err(|e| LibraryError::ExportFailed(format!("{} export: {}", format, e)))
}

/// Retrieves the items belonging to a collection
#[derive(Debug, Clone)]
pub struct CollectionExporter {
    channel: Arc<dyn RpcChannel>,
    export_path: String,
}

impl CollectionExporter {
    pub fn new(channel: Arc<dyn RpcChannel>, export_path: impl Into<String>) -> Self {
        Self {
            channel,
            export_path: export_path.into(),
        }
    }

    /// Path of the file-style export for a collection
    pub fn export_url(
        &self,
        library_id: LibraryId,
        collection_key: &str,
        format: ExportFormat,
    ) -> String {
        format!(
            "{}?/{}/{}.{}",
            self.export_path,
            library_id,
            collection_key,
            format.as_str()
        )
    }

    /// Raw export body of a collection, any format
    pub async fn export_text(
        &self,
        collection: &ResolvedCollection,
        format: ExportFormat,
    ) -> Result<String, LibraryError> {
        let url = self.export_url(collection.library_id, &collection.collection_key, format);
        self.channel.fetch(&url).await.map_err(export_error)
    }

    /// Items of a collection in a JSON format
    pub async fn export_items(
        &self,
        collection: &ResolvedCollection,
        format: ExportFormat,
    ) -> Result<Vec<RawItem>, LibraryError> {
        if !format.is_json() {
            return Err(LibraryError::ExportFailed(format!(
                "{} is a text format and yields no items",
                format
            )));
        }

        let body = self.export_text(collection, format).await?;
        let items = parse_items(&body, format)?;

        tracing::debug!(
            library_id = collection.library_id,
            collection = %collection.collection_key,
            %format,
            items = items.len(),
            "exported collection"
        );

        Ok(items)
    }

    /// Export arbitrary citation keys through `item.export`
    pub async fn export_keys(
        &self,
        keys: &[String],
        format: ExportFormat,
        library_id: LibraryId,
    ) -> Result<String, LibraryError> {
        let result = self
            .channel
            .call(
                methods::ITEM_EXPORT,
                json!([keys, format.as_str(), library_id]),
            )
            .await
            .map_err(export_error)?;

        // result is [status, content-type, body]
        result
            .get(2)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LibraryError::ExportFailed("item.export result has no exported text".to_string())
            })
    }
}
