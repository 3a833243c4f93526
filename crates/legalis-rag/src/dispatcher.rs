//! The model dispatcher: priority-ordered fallback, health tracking, and
//! retry with backoff (§3 ModelEntry, §4.F).
//!
//! Grounded on the retry/fallback/circuit-breaker machinery and the
//! priority-candidate-selection pattern of the intelligence-layer crate
//! this crate is built from, unified into a single dispatcher that owns
//! `ModelEntry` state exclusively (§3 Ownership, §9 Design Notes item F:
//! unidirectional health ownership).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;

use crate::cancellation::CancellationToken;
use crate::config::RagConfig;
use crate::error::RagError;
use crate::model_client::{InvokeOptions, ModelClient, ModelResponse};

/// Per-model lifecycle label (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Loading,
    Healthy,
    Degraded,
    Failed,
}

/// Per-model configuration (§3: "config: timeout, max retries,
/// error-rate threshold, latency threshold").
#[derive(Debug, Clone)]
pub struct ModelEntryConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub error_rate_threshold: f64,
    pub latency_threshold_ms: u64,
    pub window_size: usize,
    /// How long a `FAILED` model stays excluded from the candidate list
    /// before it is retried as half-open (§6 `health_check_interval_seconds`).
    pub health_check_interval: Duration,
    /// Consecutive hard failures before the model is marked `FAILED`.
    /// Not separately enumerated in the external configuration surface
    /// (§6); a fixed implementation default, per `DESIGN.md`.
    pub consecutive_failure_cutoff: u32,
}

impl Default for ModelEntryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            error_rate_threshold: 0.5,
            latency_threshold_ms: 5000,
            window_size: 100,
            health_check_interval: Duration::from_secs(60),
            consecutive_failure_cutoff: 3,
        }
    }
}

/// Derives per-model dispatcher settings from the single external
/// configuration surface (§6), so `RagConfig`'s retry/health-tracking
/// fields actually drive dispatcher behavior instead of sitting unread.
/// `consecutive_failure_cutoff` has no `RagConfig` counterpart and keeps
/// its implementation default.
impl From<&RagConfig> for ModelEntryConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.model_timeout_seconds),
            max_retries: config.max_model_retries,
            error_rate_threshold: config.error_rate_threshold,
            latency_threshold_ms: config.latency_threshold_ms,
            window_size: config.window_size,
            health_check_interval: Duration::from_secs(config.health_check_interval_seconds),
            ..Default::default()
        }
    }
}

/// Dispatcher-owned health state for a single model.
pub struct ModelEntry {
    pub id: String,
    pub priority: u32,
    status: ModelStatus,
    window: VecDeque<bool>,
    latencies: VecDeque<Duration>,
    success_count: u64,
    failure_count: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_transition: Instant,
    config: ModelEntryConfig,
}

impl ModelEntry {
    pub fn new(id: impl Into<String>, priority: u32, config: ModelEntryConfig) -> Self {
        Self {
            id: id.into(),
            priority,
            status: ModelStatus::Loading,
            window: VecDeque::new(),
            latencies: VecDeque::new(),
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            last_error: None,
            last_transition: Instant::now(),
            config,
        }
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    fn push_outcome(&mut self, success: bool) {
        self.window.push_back(success);
        if self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
    }

    fn error_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        failures as f64 / self.window.len() as f64
    }

    fn transition(&mut self, to: ModelStatus) {
        if self.status != to {
            self.status = to;
            self.last_transition = Instant::now();
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.push_outcome(true);
        self.latencies.push_back(latency);
        if self.latencies.len() > self.config.window_size {
            self.latencies.pop_front();
        }
        match self.status {
            ModelStatus::Loading | ModelStatus::Degraded | ModelStatus::Failed => {
                self.transition(ModelStatus::Healthy);
            }
            ModelStatus::Healthy => {}
        }
    }

    /// Records a failed attempt. `forced_unavailable` marks the model
    /// `FAILED` immediately, regardless of the error-rate/consecutive
    /// thresholds (the underlying client reported itself unavailable).
    pub fn record_failure(&mut self, message: String, forced_unavailable: bool) {
        self.failure_count += 1;
        self.consecutive_failures += 1;
        self.push_outcome(false);
        self.last_error = Some(message);

        if forced_unavailable || self.consecutive_failures >= self.config.consecutive_failure_cutoff {
            self.transition(ModelStatus::Failed);
        } else if self.error_rate() > self.config.error_rate_threshold {
            self.transition(ModelStatus::Degraded);
        }
    }

    pub fn rolling_error_rate(&self) -> f64 {
        self.error_rate()
    }

    pub fn latency_percentile(&self, pct: f64) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.latencies.iter().copied().collect();
        sorted.sort();
        let idx = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
        sorted.get(idx).copied()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }

    /// Resets rolling metrics and returns the model to `LOADING`, as
    /// used by the status interface's "reload" operation (§4.I).
    pub fn reload(&mut self) {
        self.window.clear();
        self.latencies.clear();
        self.success_count = 0;
        self.failure_count = 0;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.transition(ModelStatus::Loading);
    }
}

struct Candidate {
    client: Arc<dyn ModelClient>,
    entry: Arc<Mutex<ModelEntry>>,
}

/// Priority-ordered fallback dispatcher over a fixed set of model
/// clients. Exclusively owns all [`ModelEntry`] mutation (§3).
pub struct Dispatcher {
    candidates: Vec<Candidate>,
    base_delay: Duration,
    jitter: bool,
}

fn backoff_delay(base_delay: Duration, attempt: u32, jitter: bool) -> Duration {
    let mut delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
    if jitter {
        let jitter_ms = rand::rng().random_range(0..=(delay.as_millis() as u64).max(1));
        delay += Duration::from_millis(jitter_ms / 4);
    }
    delay
}

impl Dispatcher {
    /// Builds a dispatcher from `(client, priority, config)` triples.
    /// Lower `priority` is tried first.
    pub fn new(
        models: Vec<(Arc<dyn ModelClient>, u32, ModelEntryConfig)>,
        base_delay: Duration,
        jitter: bool,
    ) -> Self {
        let mut models = models;
        models.sort_by_key(|(_, priority, _)| *priority);
        let candidates: Vec<Candidate> = models
            .into_iter()
            .map(|(client, priority, config)| {
                let id = client.name().to_string();
                Candidate {
                    client,
                    entry: Arc::new(Mutex::new(ModelEntry::new(id, priority, config))),
                }
            })
            .collect();
        Self {
            candidates,
            base_delay,
            jitter,
        }
    }

    /// Builds a dispatcher whose per-model [`ModelEntryConfig`] is derived
    /// from the single external `RagConfig` surface (§6), so retry/health
    /// settings configured there actually take effect.
    pub fn from_config(
        models: Vec<(Arc<dyn ModelClient>, u32)>,
        config: &RagConfig,
        base_delay: Duration,
        jitter: bool,
    ) -> Self {
        let entry_config = ModelEntryConfig::from(config);
        let models = models
            .into_iter()
            .map(|(client, priority)| (client, priority, entry_config.clone()))
            .collect();
        Self::new(models, base_delay, jitter)
    }

    /// Read-only snapshot access, for status reporting (§4.I).
    pub async fn entries(&self) -> Vec<Arc<Mutex<ModelEntry>>> {
        self.candidates.iter().map(|c| c.entry.clone()).collect()
    }

    pub fn entry_by_id(&self, id: &str) -> Option<Arc<Mutex<ModelEntry>>> {
        self.candidates
            .iter()
            .find(|c| c.client.name() == id)
            .map(|c| c.entry.clone())
    }

    /// Priority-ordered candidates eligible for this attempt. A `FAILED`
    /// model is excluded unless its `health_check_interval` has elapsed
    /// since it failed, at which point it becomes eligible again
    /// ("half-open", mirroring a circuit breaker's open-to-half-open
    /// transition) only if no non-`FAILED` candidate remains.
    async fn ordered_candidates(&self) -> Vec<&Candidate> {
        let mut healthy = Vec::new();
        let mut half_open = Vec::new();
        for c in &self.candidates {
            let entry = c.entry.lock().await;
            if entry.status() != ModelStatus::Failed {
                healthy.push(c);
            } else if entry.last_transition().elapsed() >= entry.config.health_check_interval {
                half_open.push(c);
            }
        }
        if healthy.is_empty() { half_open } else { healthy }
    }

    /// Dispatches `prompt`, trying candidates in priority order with
    /// per-candidate retry and backoff, until one succeeds or all fail.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &InvokeOptions,
        cancellation: &CancellationToken,
    ) -> Result<(ModelResponse, String), RagError> {
        let candidates = self.ordered_candidates().await;
        let mut last_error: Option<RagError> = None;

        for candidate in candidates {
            let max_retries = candidate.entry.lock().await.config.max_retries;

            for attempt in 0..max_retries.max(1) {
                if cancellation.is_cancelled() {
                    return Err(RagError::Cancelled);
                }
                if attempt > 0 {
                    let delay = backoff_delay(self.base_delay, attempt - 1, self.jitter);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancellation.cancelled() => return Err(RagError::Cancelled),
                    }
                }

                let started = Instant::now();
                let timeout = candidate.entry.lock().await.config.timeout;
                let attempt_result = tokio::select! {
                    result = tokio::time::timeout(timeout, candidate.client.invoke(prompt, options)) => result,
                    _ = cancellation.cancelled() => return Err(RagError::Cancelled),
                };

                match attempt_result {
                    Ok(Ok(response)) => {
                        let mut entry = candidate.entry.lock().await;
                        let was_degraded = entry.status() == ModelStatus::Degraded;
                        entry.record_success(started.elapsed());
                        if was_degraded {
                            tracing::info!(model_id = %candidate.client.name(), "model recovered to healthy");
                        }
                        return Ok((response, candidate.client.name().to_string()));
                    }
                    Ok(Err(err)) => {
                        let forced_unavailable = matches!(err, RagError::ModelUnavailable { .. });
                        let retryable = err.is_retryable();
                        tracing::warn!(model_id = %candidate.client.name(), attempt, error = %err, "model attempt failed");
                        let mut entry = candidate.entry.lock().await;
                        entry.record_failure(err.to_string(), forced_unavailable);
                        if entry.status() == ModelStatus::Failed {
                            tracing::warn!(model_id = %candidate.client.name(), "model marked failed");
                        }
                        drop(entry);
                        last_error = Some(err);
                        if !retryable {
                            break; // advance to next candidate
                        }
                    }
                    Err(_elapsed) => {
                        tracing::warn!(model_id = %candidate.client.name(), attempt, "model attempt timed out");
                        candidate
                            .entry
                            .lock()
                            .await
                            .record_failure("attempt timed out".to_string(), false);
                        last_error = Some(RagError::ModelTransient {
                            model_id: candidate.client.name().to_string(),
                            message: "attempt timed out".to_string(),
                        });
                    }
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidates available".to_string());
        tracing::error!(last_error = %last_error, "all models exhausted");
        Err(RagError::AllModelsFailed { last_error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::{MockBehavior, MockModelClient};

    fn client(id: &str, behavior: Vec<MockBehavior>) -> Arc<dyn ModelClient> {
        Arc::new(MockModelClient::new(id, behavior))
    }

    fn cfg() -> ModelEntryConfig {
        ModelEntryConfig {
            timeout: Duration::from_secs(1),
            max_retries: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn healthy_higher_priority_model_is_used() {
        let primary = client("primary", vec![MockBehavior::Success("from primary".into())]);
        let secondary = client("secondary", vec![MockBehavior::Success("from secondary".into())]);
        let dispatcher = Dispatcher::new(
            vec![(primary, 0, cfg()), (secondary, 1, cfg())],
            Duration::from_millis(1),
            false,
        );
        let (resp, model_id) = dispatcher
            .generate("q", &InvokeOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(model_id, "primary");
        assert_eq!(resp.text, "from primary");
    }

    #[tokio::test]
    async fn permanent_failure_advances_to_next_model() {
        let primary = client("primary", vec![MockBehavior::Permanent]);
        let secondary = client("secondary", vec![MockBehavior::Success("from secondary".into())]);
        let dispatcher = Dispatcher::new(
            vec![(primary, 0, cfg()), (secondary, 1, cfg())],
            Duration::from_millis(1),
            false,
        );
        let (resp, model_id) = dispatcher
            .generate("q", &InvokeOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(model_id, "secondary");
        assert_eq!(resp.text, "from secondary");
    }

    #[tokio::test]
    async fn unavailable_marks_model_failed() {
        let primary = client(
            "primary",
            vec![MockBehavior::Unavailable, MockBehavior::Success("late".into())],
        );
        let secondary = client("secondary", vec![MockBehavior::Success("from secondary".into())]);
        let dispatcher = Dispatcher::new(
            vec![(primary, 0, cfg()), (secondary, 1, cfg())],
            Duration::from_millis(1),
            false,
        );
        let (_resp, model_id) = dispatcher
            .generate("q", &InvokeOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(model_id, "secondary");

        let primary_entry = dispatcher.entry_by_id("primary").unwrap();
        assert_eq!(primary_entry.lock().await.status(), ModelStatus::Failed);
    }

    #[tokio::test]
    async fn all_models_failing_surfaces_all_models_failed() {
        let primary = client("primary", vec![MockBehavior::Permanent]);
        let secondary = client("secondary", vec![MockBehavior::Permanent]);
        let dispatcher = Dispatcher::new(
            vec![(primary, 0, cfg()), (secondary, 1, cfg())],
            Duration::from_millis(1),
            false,
        );
        let err = dispatcher
            .generate("q", &InvokeOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AllModelsFailed");
    }

    #[tokio::test]
    async fn transient_failure_retries_same_model_before_advancing() {
        let primary = client(
            "primary",
            vec![MockBehavior::Transient, MockBehavior::Success("recovered".into())],
        );
        let dispatcher = Dispatcher::new(vec![(primary, 0, cfg())], Duration::from_millis(1), false);
        let (resp, model_id) = dispatcher
            .generate("q", &InvokeOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(model_id, "primary");
        assert_eq!(resp.text, "recovered");
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_does_not_record_failure() {
        let primary = client("primary", vec![MockBehavior::Success("ok".into())]);
        let dispatcher = Dispatcher::new(vec![(primary, 0, cfg())], Duration::from_millis(1), false);
        let token = CancellationToken::new();
        token.cancel();
        let err = dispatcher
            .generate("q", &InvokeOptions::default(), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Cancelled");
        let entry = dispatcher.entry_by_id("primary").unwrap();
        assert_eq!(entry.lock().await.status(), ModelStatus::Loading);
    }
}
