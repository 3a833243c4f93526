//! The retrieval contract (§4.A, §6) and a test double.
//!
//! The core does not assume an embedding model or index type — a
//! `Retriever` is an oracle the orchestrator calls once per query. This
//! mirrors the `DocumentStore` trait in the intelligence-layer crate this
//! module is grounded on, narrowed to the single operation the pipeline
//! needs.

use async_trait::async_trait;
use legalis_core::Document;

use crate::error::RagError;

/// External retrieval dependency: vector similarity search over the
/// statute/judgment corpus.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns up to `k` documents sorted by descending `similarity`.
    /// An empty corpus or no matches above the index's own floor is a
    /// valid, non-error result — the orchestrator treats it as the
    /// "no sources found" path (§4.H step 2).
    async fn search(&self, query_text: &str, k: usize) -> Result<Vec<Document>, RagError>;
}

/// An in-memory retriever returning a fixed document set, for tests.
/// Mirrors the pattern-matching test-double convention used for LLM
/// providers elsewhere in this workspace, narrowed to retrieval.
pub struct MockRetriever {
    documents: Vec<Document>,
    unavailable: bool,
}

impl MockRetriever {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            documents: Vec::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn search(&self, _query_text: &str, k: usize) -> Result<Vec<Document>, RagError> {
        if self.unavailable {
            return Err(RagError::RetrieverUnavailable("mock retriever down".into()));
        }
        let mut docs = self.documents.clone();
        docs.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        docs.truncate(k);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalis_core::DocumentMetadata;

    fn doc(uuid: &str, sim: f64) -> Document {
        Document::new(uuid, "content", DocumentMetadata::with_title("t"), sim).unwrap()
    }

    #[tokio::test]
    async fn returns_top_k_by_descending_similarity() {
        let retriever = MockRetriever::new(vec![doc("a", 0.5), doc("b", 0.9), doc("c", 0.7)]);
        let results = retriever.search("query", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].uuid, "b");
        assert_eq!(results[1].uuid, "c");
    }

    #[tokio::test]
    async fn unavailable_retriever_errors() {
        let retriever = MockRetriever::unavailable();
        let err = retriever.search("q", 5).await.unwrap_err();
        assert_eq!(err.kind(), "RetrieverUnavailable");
    }
}
