//! Typed access to the reference library: path resolution, export and attachments.
//!
//! Every operation here propagates failures unchanged and never retries;
//! callers decide what to do with a [`LibraryError`].

mod attachments;
mod cache;
mod exporter;
mod resolver;

pub use attachments::AttachmentFetcher;
pub use cache::{CacheResult, LibraryCache};
pub use exporter::{CollectionExporter, ExportFormat};
pub use resolver::{AmbiguityPolicy, CollectionPathResolver};

use crate::models::{ErrorKind, ReferenceError};
use crate::rpc::RpcError;

/// Errors from library operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    /// Transport failure: connection refused, timeout
    #[error("Zotero is not reachable: {0}")]
    ServiceUnreachable(String),

    /// Payload present but not of the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Collection or item export rejected by the service
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// A path segment matched nothing; depth 0 is the library name
    #[error("No match for '{segment}' at depth {depth} of collection path '{path}'")]
    PathNotFound {
        path: String,
        segment: String,
        depth: usize,
    },

    /// Several siblings share a name and the policy forbids picking one
    #[error("'{segment}' matches {count} entries at depth {depth} of collection path '{path}'")]
    AmbiguousName {
        path: String,
        segment: String,
        depth: usize,
        count: usize,
    },

    /// Path has no collection segment after the library name
    #[error("Collection path '{0}' names no collection")]
    EmptyPath(String),
}

impl LibraryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::ServiceUnreachable(_) => ErrorKind::ServiceUnreachable,
            LibraryError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            LibraryError::ExportFailed(_) => ErrorKind::ExportFailed,
            LibraryError::PathNotFound { .. } | LibraryError::EmptyPath(_) => {
                ErrorKind::PathNotFound
            }
            LibraryError::AmbiguousName { .. } => ErrorKind::AmbiguousName,
        }
    }

    /// Whether a later attempt could succeed without any change on our side
    pub fn is_transient(&self) -> bool {
        matches!(self, LibraryError::ServiceUnreachable(_))
    }
}

impl From<RpcError> for LibraryError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Unreachable(msg) | RpcError::Transport(msg) => {
                LibraryError::ServiceUnreachable(msg)
            }
            RpcError::Timeout => LibraryError::ServiceUnreachable("request timed out".to_string()),
            RpcError::Malformed(msg) => LibraryError::MalformedResponse(msg),
            other @ (RpcError::Status(_) | RpcError::Remote { .. }) => {
                LibraryError::MalformedResponse(other.to_string())
            }
        }
    }
}

impl From<&LibraryError> for ReferenceError {
    fn from(err: &LibraryError) -> Self {
        ReferenceError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
