//! The retrieval-result record: a [`Document`] returned by a vector store,
//! and the closed [`DocumentMetadata`] record attached to it.
//!
//! Metadata on a retrieved document used to be modeled as a loosely-typed
//! dict of attributes. Here it is a closed record with typed optional
//! fields for everything the pipeline actually reasons about, and a single
//! `extra` bag for whatever free-form legal metadata an ingestion pipeline
//! attaches. Nothing in `legalis-rag` pattern-matches on `extra`'s keys.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MetadataError;

/// The kind of legal instrument a document represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Legislation,
    Judgment,
    Regulation,
    Constitution,
    #[serde(other)]
    Unknown,
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Unknown
    }
}

/// Crawl/ingestion freshness state of a document, as maintained by the
/// (out-of-scope) ingestion pipeline and merely read here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Active,
    Stale,
    Broken,
    Pending,
}

impl Default for CrawlStatus {
    fn default() -> Self {
        CrawlStatus::Active
    }
}

/// Typed metadata attached to a retrieved [`Document`].
///
/// Every field the core pipeline reasons about (freshness, citation
/// formatting, legal-metadata passthrough) is named explicitly; anything
/// else lives in `extra` and is opaque to the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub document_type: DocumentType,
    pub legal_area: Option<String>,
    pub court_name: Option<String>,
    pub case_number: Option<String>,
    pub act_chapter: Option<String>,
    /// The date the underlying instrument was enacted or decided.
    pub document_date: Option<DateTime<Utc>>,
    /// When the ingestion pipeline last crawled this document; the
    /// reference timestamp for freshness scoring (§4.B).
    pub crawled_at: Option<DateTime<Utc>>,
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub crawl_status: CrawlStatus,
    /// Free-form legal metadata not modeled above. Never pattern-matched
    /// on by core logic; carried through to `StructuredSource.metadata`
    /// verbatim where the ingestion schema permits.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    /// A metadata record with only a title set; convenient for tests and
    /// for callers that have nothing richer to offer.
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// A document returned by the retriever: stable id, full text, metadata,
/// and a relevance score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub uuid: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Retrieval relevance, constrained to `[0, 1]` by construction.
    pub similarity: f64,
}

impl Document {
    /// Constructs a document, validating the core's stated requirements
    /// (§4.A): a stable, non-empty `uuid`, non-empty `content`, and
    /// `similarity` in `[0, 1]`.
    pub fn new(
        uuid: impl Into<String>,
        content: impl Into<String>,
        metadata: DocumentMetadata,
        similarity: f64,
    ) -> Result<Self, MetadataError> {
        let uuid = uuid.into();
        if uuid.is_empty() {
            return Err(MetadataError::MissingField { field: "uuid" });
        }
        let content = content.into();
        if content.is_empty() {
            return Err(MetadataError::MissingField { field: "content" });
        }
        if !(0.0..=1.0).contains(&similarity) {
            return Err(MetadataError::SimilarityOutOfRange(similarity));
        }
        Ok(Self {
            uuid,
            content,
            metadata,
            similarity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_similarity() {
        let meta = DocumentMetadata::with_title("Employment Act");
        let err = Document::new("u1", "text", meta, 1.5).unwrap_err();
        assert_eq!(err, MetadataError::SimilarityOutOfRange(1.5));
    }

    #[test]
    fn accepts_boundary_similarity() {
        let meta = DocumentMetadata::with_title("t");
        assert!(Document::new("u1", "c", meta.clone(), 0.0).is_ok());
        assert!(Document::new("u2", "c", meta, 1.0).is_ok());
    }

    #[test]
    fn rejects_empty_uuid() {
        let meta = DocumentMetadata::with_title("t");
        let err = Document::new("", "content", meta, 0.5).unwrap_err();
        assert_eq!(err, MetadataError::MissingField { field: "uuid" });
    }

    #[test]
    fn rejects_empty_content() {
        let meta = DocumentMetadata::with_title("t");
        let err = Document::new("u1", "", meta, 0.5).unwrap_err();
        assert_eq!(err, MetadataError::MissingField { field: "content" });
    }

    #[test]
    fn unknown_document_type_round_trips() {
        let json = serde_json::json!({"document_type": "weird"});
        let meta: DocumentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta.document_type, DocumentType::Unknown);
    }

    proptest::proptest! {
        #[test]
        fn similarity_acceptance_matches_unit_interval(s in -10.0f64..10.0) {
            let meta = DocumentMetadata::with_title("t");
            let result = Document::new("u1", "content", meta, s);
            if (0.0..=1.0).contains(&s) {
                proptest::prop_assert!(result.is_ok());
            } else {
                proptest::prop_assert_eq!(result.unwrap_err(), MetadataError::SimilarityOutOfRange(s));
            }
        }
    }
}
