//! Legalis-Core: shared data model for the Legalis RAG engine.
//!
//! This crate defines the retrieval-result record ([`Document`]) and its
//! typed metadata, plus the small error type used when constructing or
//! validating those records. It has no async runtime dependency and
//! performs no I/O — the pipeline crate (`legalis-rag`) builds on top of
//! these types.

mod document;
mod error;

pub use document::{CrawlStatus, Document, DocumentMetadata, DocumentType};
pub use error::MetadataError;
