//! Core data models for libraries, exported items and reference views.

mod item;
mod library;
mod reference;

pub use item::{
    AnnotationKind, AnnotationRecord, AttachmentRecord, BibliographicItem, CitationKey,
    IssuedDate, RawItem,
};
pub use library::{
    Collection, CollectionKey, CollectionPath, Library, LibraryId, ResolvedCollection,
};
pub use reference::{
    ErrorKind, ItemView, ReferenceError, ReferenceSet, ReferenceView, ViewMode, ViewState,
};
