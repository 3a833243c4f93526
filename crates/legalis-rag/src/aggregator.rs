//! The query orchestrator: end-to-end pipeline, confidence/freshness
//! aggregation, response assembly (§4.H).
//!
//! Owns the per-query working set exclusively (§3 Ownership); reads
//! dispatcher health only through [`crate::status::StatusReporter`]
//! snapshots, never mutating it directly (§9 Design Notes item F).

use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::cache::{CacheEntry, ResponseCache, fingerprint, normalize_prompt};
use crate::cancellation::CancellationToken;
use crate::config::RagConfig;
use crate::context::{AssembledContext, CharDiv4Estimator, CitationMap, TokenEstimator, build_context, build_prompt};
use crate::dispatcher::Dispatcher;
use crate::error::RagError;
use crate::model_client::InvokeOptions;
use crate::retriever::Retriever;
use crate::source::{StructuredSource, build_sources, dedup_by_uuid, freshness_and_relevance};

/// A terminal error surfaced to the caller (§7): a stable `kind` plus a
/// human-readable message.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryMetadata {
    pub confidence: f64,
    pub freshness_score: f64,
    pub citation_count: usize,
    pub use_citations: bool,
}

/// The response envelope (§3 QueryResult).
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<StructuredSource>,
    pub citation_map: CitationMap,
    pub model_used: String,
    pub retrieved_documents: usize,
    pub context_tokens: usize,
    pub total_tokens: usize,
    pub latency_ms: u64,
    pub metadata: QueryMetadata,
    pub error: Option<ErrorObject>,
}

impl QueryResult {
    fn error(err: RagError, elapsed: Duration) -> Self {
        Self {
            success: false,
            answer: String::new(),
            sources: Vec::new(),
            citation_map: CitationMap::new(),
            model_used: String::new(),
            retrieved_documents: 0,
            context_tokens: 0,
            total_tokens: 0,
            latency_ms: elapsed.as_millis() as u64,
            metadata: QueryMetadata {
                confidence: 0.0,
                freshness_score: 0.0,
                citation_count: 0,
                use_citations: false,
            },
            error: Some(ErrorObject {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// Ties the retriever, context/prompt builder, cache, and dispatcher
/// into the end-to-end query operation.
pub struct QueryEngine {
    retriever: Box<dyn Retriever>,
    dispatcher: Dispatcher,
    cache: ResponseCache,
    config: RagConfig,
    estimator: Box<dyn TokenEstimator>,
}

impl QueryEngine {
    pub fn new(retriever: Box<dyn Retriever>, dispatcher: Dispatcher, config: RagConfig) -> Self {
        let cache = ResponseCache::new(config.cache_max_entries);
        Self {
            retriever,
            dispatcher,
            cache,
            config,
            estimator: Box::new(CharDiv4Estimator),
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Answers `question`, threading `cancellation` through retrieval,
    /// context assembly, and model dispatch.
    ///
    /// `use_citations` overrides `RagConfig::enable_citations` for this
    /// call; pass `None` to use the configured default.
    pub async fn query(
        &self,
        question: &str,
        extra_context: &str,
        max_tokens: usize,
        use_citations: Option<bool>,
        cancellation: &CancellationToken,
    ) -> QueryResult {
        let use_citations = use_citations.unwrap_or(self.config.enable_citations);
        tracing::debug!(top_k = self.config.top_k, "starting query");
        let start = Instant::now();
        let query_timeout = Duration::from_secs(self.config.query_timeout_seconds);
        match tokio::time::timeout(
            query_timeout,
            self.query_inner(question, extra_context, max_tokens, use_citations, cancellation, start),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(?query_timeout, "query timed out");
                QueryResult::error(RagError::Timeout(query_timeout), start.elapsed())
            }
        }
    }

    async fn query_inner(
        &self,
        question: &str,
        extra_context: &str,
        max_tokens: usize,
        use_citations: bool,
        cancellation: &CancellationToken,
        start: Instant,
    ) -> QueryResult {
        if cancellation.is_cancelled() {
            return QueryResult::error(RagError::Cancelled, start.elapsed());
        }

        let retriever_timeout = Duration::from_secs(self.config.retriever_timeout_seconds);
        let docs = tokio::select! {
            result = tokio::time::timeout(retriever_timeout, self.retriever.search(question, self.config.top_k)) => {
                match result {
                    Ok(Ok(docs)) => docs,
                    Ok(Err(e)) => return QueryResult::error(e, start.elapsed()),
                    Err(_) => return QueryResult::error(RagError::RetrieverTimeout(retriever_timeout), start.elapsed()),
                }
            }
            _ = cancellation.cancelled() => return QueryResult::error(RagError::Cancelled, start.elapsed()),
        };
        let docs = dedup_by_uuid(docs);

        if docs.is_empty() {
            return QueryResult {
                success: true,
                answer: "information not available in the retrieved sources".to_string(),
                sources: Vec::new(),
                citation_map: CitationMap::new(),
                model_used: String::new(),
                retrieved_documents: 0,
                context_tokens: 0,
                total_tokens: 0,
                latency_ms: start.elapsed().as_millis() as u64,
                metadata: QueryMetadata {
                    confidence: 0.0,
                    freshness_score: 0.0,
                    citation_count: 0,
                    use_citations,
                },
                error: None,
            };
        }

        let effective_budget = max_tokens.min(self.config.max_context_tokens);
        let AssembledContext { context, citation_map } =
            build_context(&docs, effective_budget, use_citations, self.estimator.as_ref());
        let prompt = build_prompt(&context, question, extra_context, use_citations);
        let context_tokens = self.estimator.estimate(&context);

        let model_set_signature = self.config.model_priority_order().join(",");
        let fp = fingerprint(&normalize_prompt(&prompt), &model_set_signature);
        let ttl = Duration::from_secs(self.config.cache_ttl_seconds);
        let invoke_options = InvokeOptions {
            max_tokens: effective_budget,
            timeout: Duration::from_secs(self.config.model_timeout_seconds),
        };

        let usage_tokens: StdMutex<Option<usize>> = StdMutex::new(None);
        let compute = || async {
            let (response, model_id) = self
                .dispatcher
                .generate(&prompt, &invoke_options, cancellation)
                .await?;
            *usage_tokens.lock().unwrap() = Some(response.prompt_tokens + response.completion_tokens);
            Ok(CacheEntry {
                answer: response.text,
                model_id,
                created_at: Instant::now(),
                ttl,
            })
        };

        let (cache_entry, was_hit) = match self.cache.get_or_compute(fp, compute).await {
            Ok(v) => v,
            Err(e) => return QueryResult::error(e, start.elapsed()),
        };

        let answer = cache_entry.answer;
        let model_used = if was_hit {
            "cache".to_string()
        } else {
            cache_entry.model_id
        };
        let total_tokens = if was_hit {
            context_tokens + self.estimator.estimate(&answer)
        } else {
            usage_tokens
                .lock()
                .unwrap()
                .take()
                .unwrap_or(context_tokens)
        };

        let sources = build_sources(
            &docs,
            &citation_map,
            question,
            &self.config.stopwords,
            self.config.snippet_length,
            Utc::now(),
            use_citations,
        );

        let pairs = freshness_and_relevance(&sources);
        let (numerator, denominator) = pairs
            .iter()
            .fold((0.0, 0.0), |(n, d), (rel, fresh)| (n + rel * fresh, d + fresh));
        let confidence = if denominator > 0.0 { numerator / denominator } else { 0.0 };
        let freshness_score = if pairs.is_empty() {
            0.0
        } else {
            pairs.iter().map(|(_, f)| f).sum::<f64>() / pairs.len() as f64
        };

        let returned_citation_map = if use_citations { citation_map } else { CitationMap::new() };
        let citation_count = returned_citation_map.len();

        QueryResult {
            success: true,
            answer,
            sources,
            citation_map: returned_citation_map,
            model_used,
            retrieved_documents: docs.len(),
            context_tokens,
            total_tokens,
            latency_ms: start.elapsed().as_millis() as u64,
            metadata: QueryMetadata {
                confidence,
                freshness_score,
                citation_count,
                use_citations,
            },
            error: None,
        }
    }
}
