//! Legalis-RAG: the retrieval-augmented query pipeline for Kenyan-law
//! question answering.
//!
//! The pipeline is a linear flow with two pluggable collaborators
//! (retriever, model dispatcher) and an in-process cache:
//!
//! ```text
//! Query -> Retriever -> ranked docs
//!       -> context/prompt builder -> citation-aware prompt
//!       -> cache lookup / model dispatcher -> raw answer
//!       -> source builder -> structured sources
//!       -> aggregator -> confidence, freshness, response envelope
//! ```

pub mod aggregator;
pub mod cache;
pub mod cancellation;
pub mod citation;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod freshness;
pub mod model_client;
pub mod retriever;
pub mod source;
pub mod status;

pub use aggregator::{ErrorObject, QueryEngine, QueryMetadata, QueryResult};
pub use cancellation::CancellationToken;
pub use config::RagConfig;
pub use dispatcher::{Dispatcher, ModelEntry, ModelEntryConfig, ModelStatus};
pub use error::RagError;
pub use model_client::{InvokeOptions, ModelClient, ModelResponse};
pub use retriever::Retriever;
pub use source::StructuredSource;
pub use status::{ModelStatusSnapshot, StatusReporter};
