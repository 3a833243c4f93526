//! Read-only model-status reporting (§4.I).
//!
//! Grounded on the `HealthStats`/`HealthChecker` shape from the
//! intelligence-layer crate this crate is built from, narrowed to
//! snapshot the dispatcher's own `ModelEntry` state rather than probing
//! a live provider.

use std::time::Instant;

use crate::dispatcher::{Dispatcher, ModelStatus};
use crate::error::RagError;

/// A read-only snapshot of one model's health.
#[derive(Debug, Clone)]
pub struct ModelStatusSnapshot {
    pub id: String,
    pub status: ModelStatus,
    pub rolling_error_rate: f64,
    pub p50_latency_ms: Option<u64>,
    pub p95_latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_transition: Instant,
}

/// Reports and reloads model health on top of a [`Dispatcher`]. The
/// dispatcher remains the sole owner of `ModelEntry` mutation; this type
/// only reads snapshots and forwards the explicit `reload` request
/// (§9 Design Notes item F: unidirectional health ownership).
pub struct StatusReporter<'a> {
    dispatcher: &'a Dispatcher,
}

impl<'a> StatusReporter<'a> {
    pub fn new(dispatcher: &'a Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub async fn snapshot_all(&self) -> Vec<ModelStatusSnapshot> {
        let mut snapshots = Vec::new();
        for entry in self.dispatcher.entries().await {
            let entry = entry.lock().await;
            snapshots.push(ModelStatusSnapshot {
                id: entry.id.clone(),
                status: entry.status(),
                rolling_error_rate: entry.rolling_error_rate(),
                p50_latency_ms: entry.latency_percentile(0.50).map(|d| d.as_millis() as u64),
                p95_latency_ms: entry.latency_percentile(0.95).map(|d| d.as_millis() as u64),
                last_error: entry.last_error().map(str::to_string),
                last_transition: entry.last_transition(),
            });
        }
        snapshots
    }

    /// Re-initializes a single model: resets its rolling metrics and
    /// transitions it back to `LOADING`. A real deployment would follow
    /// this with a health probe; here the probe is represented by the
    /// caller's next `generate` call naturally transitioning it to
    /// `HEALTHY` or `FAILED`.
    pub async fn reload(&self, model_id: &str) -> Result<(), RagError> {
        let entry = self
            .dispatcher
            .entry_by_id(model_id)
            .ok_or_else(|| RagError::Internal(format!("unknown model id: {model_id}")))?;
        entry.lock().await.reload();
        Ok(())
    }

    /// No-op hook for a future tuning routine (§4.I, §9 Open Question 3).
    /// Its absence must not affect the pipeline; it is never called from
    /// anywhere in the query path.
    pub fn optimize(&self) -> Result<(), RagError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::dispatcher::ModelEntryConfig;
    use crate::model_client::{InvokeOptions, MockBehavior, MockModelClient, ModelClient};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn snapshot_reflects_healthy_model_after_success() {
        let client: Arc<dyn ModelClient> =
            Arc::new(MockModelClient::always_succeeds("m1", "answer"));
        let dispatcher = Dispatcher::new(
            vec![(client, 0, ModelEntryConfig::default())],
            Duration::from_millis(1),
            false,
        );
        dispatcher
            .generate("q", &InvokeOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let reporter = StatusReporter::new(&dispatcher);
        let snapshots = reporter.snapshot_all().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, ModelStatus::Healthy);
    }

    #[tokio::test]
    async fn reload_resets_status_to_loading() {
        let client: Arc<dyn ModelClient> = Arc::new(MockModelClient::new(
            "m1",
            vec![MockBehavior::Permanent],
        ));
        let dispatcher = Dispatcher::new(
            vec![(client, 0, ModelEntryConfig { max_retries: 1, ..Default::default() })],
            Duration::from_millis(1),
            false,
        );
        let _ = dispatcher
            .generate("q", &InvokeOptions::default(), &CancellationToken::new())
            .await;

        let reporter = StatusReporter::new(&dispatcher);
        reporter.reload("m1").await.unwrap();
        let snapshots = reporter.snapshot_all().await;
        assert_eq!(snapshots[0].status, ModelStatus::Loading);
    }

    #[tokio::test]
    async fn optimize_is_a_harmless_no_op() {
        let client: Arc<dyn ModelClient> =
            Arc::new(MockModelClient::always_succeeds("m1", "answer"));
        let dispatcher = Dispatcher::new(
            vec![(client, 0, ModelEntryConfig::default())],
            Duration::from_millis(1),
            false,
        );
        let reporter = StatusReporter::new(&dispatcher);
        assert!(reporter.optimize().is_ok());
    }
}
