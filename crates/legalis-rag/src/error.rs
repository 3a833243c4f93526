//! The closed error taxonomy of the query pipeline.
//!
//! Every fallible operation in this crate returns `Result<T, RagError>`
//! rather than `anyhow::Error`: the orchestrator's error envelope must
//! carry a stable `kind` a caller can match on, and an opaque error type
//! would erase exactly the distinction §7 depends on (retry vs. advance
//! vs. terminal).

use thiserror::Error;

/// A pipeline failure, classified by how the orchestrator and dispatcher
/// must react to it.
#[derive(Debug, Error, Clone)]
pub enum RagError {
    /// The retriever could not be reached at all. Fatal to the query.
    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    /// The retriever call exceeded its timeout. Fatal to the query.
    #[error("retriever timed out after {0:?}")]
    RetrieverTimeout(std::time::Duration),

    /// A retryable model failure (rate limit, transient transport error).
    /// Retried with backoff against the same model.
    #[error("transient model error from {model_id}: {message}")]
    ModelTransient { model_id: String, message: String },

    /// A non-retryable model failure (bad request, invalid credentials).
    /// The dispatcher advances to the next candidate without retrying.
    #[error("permanent model error from {model_id}: {message}")]
    ModelPermanent { model_id: String, message: String },

    /// The model client itself reports it cannot serve requests right
    /// now. The dispatcher marks the model `FAILED` and advances.
    #[error("model {model_id} unavailable: {message}")]
    ModelUnavailable { model_id: String, message: String },

    /// Every candidate in the fallback chain was exhausted.
    #[error("all models failed; last error: {last_error}")]
    AllModelsFailed { last_error: String },

    /// A query-level wall-clock timeout fired (independent of any single
    /// model-attempt or retriever timeout).
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The caller cancelled the query. No state changes are attributed
    /// to any model.
    #[error("query cancelled")]
    Cancelled,

    /// An internal consistency invariant was violated (e.g. citation map
    /// and sources disagree). This is a programmer error: it must panic
    /// in debug builds and fail closed (return this variant) in release.
    #[error("internal consistency error: {0}")]
    Internal(String),
}

impl RagError {
    /// A short, stable, machine-matchable label for the error envelope
    /// (§7: "an error object carrying `kind` and a human-readable
    /// message").
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::RetrieverUnavailable(_) => "RetrieverUnavailable",
            RagError::RetrieverTimeout(_) => "RetrieverTimeout",
            RagError::ModelTransient { .. } => "ModelTransient",
            RagError::ModelPermanent { .. } => "ModelPermanent",
            RagError::ModelUnavailable { .. } => "ModelUnavailable",
            RagError::AllModelsFailed { .. } => "AllModelsFailed",
            RagError::Timeout(_) => "Timeout",
            RagError::Cancelled => "Cancelled",
            RagError::Internal(_) => "Internal",
        }
    }

    /// Whether the dispatcher should retry the *same* model for this
    /// error (only `ModelTransient` is retryable in place).
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::ModelTransient { .. })
    }
}
