//! Pipeline configuration, enumerated in full per §6.
//!
//! Builder-style `with_*` setters in the style of `RAGConfig` /
//! `CacheConfig` / `RetryConfig` from the intelligence-layer crate this
//! module is modeled on.

use serde::{Deserialize, Serialize};

const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "what", "where", "when", "which", "are",
    "is", "of", "to", "in", "on", "a",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub default_model: String,
    pub fallback_models: Vec<String>,
    /// Per-attempt model timeout; converted into the dispatcher's
    /// [`crate::dispatcher::ModelEntryConfig::timeout`] (see
    /// `impl From<&RagConfig> for ModelEntryConfig`).
    pub model_timeout_seconds: u64,
    /// Converted into `ModelEntryConfig::max_retries`.
    pub max_model_retries: u32,
    /// How long a `FAILED` model is excluded before the dispatcher
    /// retries it as half-open; converted into
    /// `ModelEntryConfig::health_check_interval`.
    pub health_check_interval_seconds: u64,
    /// Not part of §6's enumerated list verbatim; added to satisfy §5's
    /// independent retriever-timeout requirement (see `DESIGN.md`).
    pub retriever_timeout_seconds: u64,
    /// Per-query wall-clock timeout, independent of model/retriever
    /// timeouts (§5). Same provenance note as above.
    pub query_timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: usize,
    /// Fraction in `(0, 1)`: trailing-window error rate above this marks
    /// a model `DEGRADED`. Converted into
    /// `ModelEntryConfig::error_rate_threshold`.
    pub error_rate_threshold: f64,
    /// Converted into `ModelEntryConfig::latency_threshold_ms`.
    pub latency_threshold_ms: u64,
    /// Size of the rolling outcome window per model (§4.F). Converted
    /// into `ModelEntryConfig::window_size`.
    pub window_size: usize,
    /// Top-k documents retrieved per query.
    pub top_k: usize,
    pub max_context_tokens: usize,
    /// Default for whether a query includes citations, used whenever a
    /// caller doesn't override it per-call via `QueryEngine::query`'s
    /// `use_citations: Option<bool>` argument.
    pub enable_citations: bool,
    pub stopwords: Vec<String>,
    pub snippet_length: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_model: "primary".to_string(),
            fallback_models: Vec::new(),
            model_timeout_seconds: 30,
            max_model_retries: 3,
            health_check_interval_seconds: 60,
            retriever_timeout_seconds: 10,
            query_timeout_seconds: 60,
            cache_ttl_seconds: 3600,
            cache_max_entries: 1000,
            error_rate_threshold: 0.5,
            latency_threshold_ms: 5000,
            window_size: 100,
            top_k: 5,
            max_context_tokens: 4000,
            enable_citations: true,
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            snippet_length: 200,
        }
    }
}

impl RagConfig {
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    pub fn with_enable_citations(mut self, enabled: bool) -> Self {
        self.enable_citations = enabled;
        self
    }

    pub fn with_cache_ttl_seconds(mut self, ttl: u64) -> Self {
        self.cache_ttl_seconds = ttl;
        self
    }

    pub fn with_cache_max_entries(mut self, max: usize) -> Self {
        self.cache_max_entries = max;
        self
    }

    pub fn with_snippet_length(mut self, len: usize) -> Self {
        self.snippet_length = len;
        self
    }

    /// The full ordered candidate list: default model first, then
    /// fallbacks, as configured.
    pub fn model_priority_order(&self) -> Vec<String> {
        let mut order = vec![self.default_model.clone()];
        order.extend(self.fallback_models.iter().cloned());
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stopwords_match_spec() {
        let cfg = RagConfig::default();
        assert!(cfg.stopwords.contains(&"the".to_string()));
        assert_eq!(cfg.stopwords.len(), DEFAULT_STOPWORDS.len());
    }

    #[test]
    fn priority_order_places_default_first() {
        let cfg = RagConfig::default()
            .with_default_model("primary")
            .with_fallback_models(vec!["secondary".to_string(), "fallback".to_string()]);
        assert_eq!(
            cfg.model_priority_order(),
            vec!["primary", "secondary", "fallback"]
        );
    }
}
