//! Error types for constructing and validating core records.
//!
//! Mirrors the closed-enum-over-dynamic-dict philosophy used throughout this
//! crate: metadata construction can fail in a small, enumerable set of ways,
//! and callers match on `kind` rather than inspecting a message string.

use thiserror::Error;

/// Failure constructing or validating a [`crate::DocumentMetadata`] or
/// [`crate::Document`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetadataError {
    /// A required field was absent (§4.A: the core requires a stable
    /// `uuid` and the presence of `content`).
    #[error("missing required document field `{field}`")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// `similarity` fell outside `[0, 1]`.
    #[error("similarity {0} is out of range [0, 1]")]
    SimilarityOutOfRange(f64),
}
