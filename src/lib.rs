//! # bibcite
//!
//! Resolves human-readable Zotero collection paths, validates the citation
//! markers of a document against the collection's Better BibTeX export, and
//! aggregates items, attachments and annotations into a reference view.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Library, BibliographicItem, ReferenceSet, etc.)
//! - [`rpc`]: JSON-RPC channel to the Better BibTeX service
//! - [`library`]: Collection path resolution, export and attachment lookup
//! - [`citations`]: Citation marker extraction
//! - [`references`]: Aggregation pipeline, view model cache and document session
//! - [`utils`]: Retry helpers
//! - [`config`]: Configuration management

pub mod citations;
pub mod config;
pub mod library;
pub mod models;
pub mod references;
pub mod rpc;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use library::{CollectionExporter, CollectionPathResolver, LibraryError};
pub use models::{CollectionPath, ReferenceSet};
pub use references::{ReferenceAggregator, ReferenceSession};
pub use rpc::{HttpRpcChannel, RpcChannel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
