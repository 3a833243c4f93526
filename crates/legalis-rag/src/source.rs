//! Structured source construction (§3 StructuredSource, §4.G).
//!
//! Walks the retained retrieval set and the citation map built alongside
//! it in [`crate::context`], producing the response-side view of each
//! retrieved document. No field derived from the model's output is
//! placed here; sources reflect retrieval, not generation.

use chrono::{DateTime, Utc};
use legalis_core::Document;
use serde::Serialize;
use serde_json::Value;

use crate::context::CitationMap;
use crate::freshness::{freshness_score, highlight};

/// Metadata carried on a [`StructuredSource`]: freshness, citation text,
/// crawl status, and a fixed whitelist of legal metadata fields.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMetadata {
    pub freshness_score: f64,
    /// Omitted when citations are disabled for the query (§4.D: disabled
    /// citations return sources with `citation_id` omitted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_text: Option<String>,
    pub crawl_status: String,
    pub court_name: Option<String>,
    pub case_number: Option<String>,
    pub act_chapter: Option<String>,
    pub document_date: Option<DateTime<Utc>>,
    pub last_verified_at: Option<DateTime<Utc>>,
}

/// The response-side view of a retrieved document.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredSource {
    pub source_id: String,
    /// `1..N` with no gaps when citations are enabled for the query;
    /// `None` when they are disabled (§4.D, §8 universal invariant).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_id: Option<usize>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: String,
    pub document_type: Value,
    pub legal_area: Option<String>,
    pub relevance_score: f64,
    pub highlighted_excerpt: String,
    pub metadata: SourceMetadata,
}

/// Deduplicates `docs` by `uuid`, keeping the first (highest-similarity,
/// since the retriever returns descending similarity) occurrence
/// (§9 Open Question 2: the source assumes the retriever already does
/// this; this pipeline enforces it defensively).
pub fn dedup_by_uuid(docs: Vec<Document>) -> Vec<Document> {
    let mut seen = std::collections::HashSet::new();
    docs.into_iter()
        .filter(|d| seen.insert(d.uuid.clone()))
        .collect()
}

fn ellipsize(content: &str, max_chars: usize) -> String {
    let char_count = content.chars().count();
    if char_count <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn crawl_status_str(doc: &Document) -> String {
    serde_json::to_value(doc.metadata.crawl_status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "active".to_string())
}

fn structured_source(
    doc: &Document,
    citation_id: Option<usize>,
    citation_text: Option<String>,
    query: &str,
    stopwords: &[String],
    snippet_length: usize,
    now: DateTime<Utc>,
) -> StructuredSource {
    let snippet = ellipsize(&doc.content, snippet_length);
    let highlighted_excerpt = highlight(&snippet, query, stopwords);
    let freshness = freshness_score(doc.metadata.crawled_at, now);

    StructuredSource {
        source_id: doc.uuid.clone(),
        citation_id,
        title: doc.metadata.title.clone(),
        url: doc.metadata.url.clone(),
        snippet,
        document_type: serde_json::to_value(doc.metadata.document_type).unwrap_or(Value::Null),
        legal_area: doc.metadata.legal_area.clone(),
        relevance_score: doc.similarity,
        highlighted_excerpt,
        metadata: SourceMetadata {
            freshness_score: freshness,
            citation_text,
            crawl_status: crawl_status_str(doc),
            court_name: doc.metadata.court_name.clone(),
            case_number: doc.metadata.case_number.clone(),
            act_chapter: doc.metadata.act_chapter.clone(),
            document_date: doc.metadata.document_date,
            last_verified_at: doc.metadata.last_verified_at,
        },
    }
}

/// Builds one `StructuredSource` per retained document.
///
/// When `use_citations` is true, sources follow `citation_map` in exact
/// citation-id order and carry `citation_id`/`citation_text`. When false,
/// sources are built directly from `docs` in retrieval order with both
/// omitted (§4.D: disabled citations return sources with `citation_id`
/// omitted; §8 universal invariant only binds `keys(citation_map)` to
/// `1..|sources|` when citations are enabled).
pub fn build_sources(
    docs: &[Document],
    citation_map: &CitationMap,
    query: &str,
    stopwords: &[String],
    snippet_length: usize,
    now: DateTime<Utc>,
    use_citations: bool,
) -> Vec<StructuredSource> {
    if use_citations {
        let mut sources = Vec::with_capacity(citation_map.len());
        for (&citation_id, citation_text) in citation_map.iter() {
            let Some(doc) = docs.get(citation_id - 1) else {
                continue;
            };
            sources.push(structured_source(
                doc,
                Some(citation_id),
                Some(citation_text.clone()),
                query,
                stopwords,
                snippet_length,
                now,
            ));
        }
        sources
    } else {
        docs.iter()
            .map(|doc| structured_source(doc, None, None, query, stopwords, snippet_length, now))
            .collect()
    }
}

/// Flattened `(relevance_score, freshness_score)` pairs, convenient for
/// the aggregator's confidence computation (§4.H step 8). Order matches
/// `sources`, not any citation numbering.
pub fn freshness_and_relevance(sources: &[StructuredSource]) -> Vec<(f64, f64)> {
    sources
        .iter()
        .map(|s| (s.relevance_score, s.metadata.freshness_score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalis_core::DocumentMetadata;

    fn doc(uuid: &str, content: &str, sim: f64) -> Document {
        Document::new(uuid, content, DocumentMetadata::with_title("t"), sim).unwrap()
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let docs = vec![doc("a", "first", 0.9), doc("a", "second", 0.5)];
        let deduped = dedup_by_uuid(docs);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].content, "first");
    }

    #[test]
    fn snippet_is_ellipsized_past_200_chars() {
        let content = "a".repeat(250);
        let out = ellipsize(&content, 200);
        assert_eq!(out.chars().count(), 203);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn snippet_untouched_under_limit() {
        let out = ellipsize("short content", 200);
        assert_eq!(out, "short content");
    }

    #[test]
    fn sources_follow_citation_map_order() {
        let docs = vec![doc("u1", "content one", 0.9), doc("u2", "content two", 0.8)];
        let mut citation_map = CitationMap::new();
        citation_map.insert(1, "Act One".to_string());
        citation_map.insert(2, "Act Two".to_string());
        let sources = build_sources(&docs, &citation_map, "query", &[], 200, Utc::now(), true);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_id, "u1");
        assert_eq!(sources[0].citation_id, Some(1));
        assert_eq!(sources[0].metadata.citation_text.as_deref(), Some("Act One"));
        assert_eq!(sources[1].source_id, "u2");
        assert_eq!(sources[1].citation_id, Some(2));
    }

    #[test]
    fn disabled_citations_omit_citation_linkage() {
        let docs = vec![doc("u1", "content one", 0.9), doc("u2", "content two", 0.8)];
        let citation_map = CitationMap::new();
        let sources = build_sources(&docs, &citation_map, "query", &[], 200, Utc::now(), false);
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().all(|s| s.citation_id.is_none()));
        assert!(sources.iter().all(|s| s.metadata.citation_text.is_none()));
    }
}
