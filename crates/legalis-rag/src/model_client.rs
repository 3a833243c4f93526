//! The `ModelClient` capability (§6, §9 Design Notes item D).
//!
//! Deep per-vendor inheritance hierarchies are replaced by a single
//! capability trait; the dispatcher in [`crate::dispatcher`] is
//! polymorphic over this trait only, the way the intelligence-layer crate
//! this module is grounded on is polymorphic over its `LLMProvider` trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RagError;

/// Options accepted by a single model invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Usage-accounted model output.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A generative-model vendor client. Replaces deep inheritance with a
/// single capability: `invoke`, `name`, `kind`.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<ModelResponse, RagError>;

    /// Stable identifier used as the dispatcher's `ModelEntry::id` and as
    /// `QueryResult.model_used`.
    fn name(&self) -> &str;

    /// A short vendor/kind tag (e.g. `"openai"`, `"anthropic"`, `"mock"`),
    /// surfaced in status snapshots for operational grouping.
    fn kind(&self) -> &str;
}

/// Scripted behavior for [`MockModelClient`], applied in order; the last
/// entry repeats once exhausted.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Success(String),
    Transient,
    Permanent,
    Unavailable,
}

/// A test double for [`ModelClient`], driven by a fixed script of
/// behaviors, mirroring the pattern-matching mock providers used
/// elsewhere in this workspace's LLM tests.
pub struct MockModelClient {
    id: String,
    script: std::sync::Mutex<Vec<MockBehavior>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockModelClient {
    pub fn new(id: impl Into<String>, script: Vec<MockBehavior>) -> Self {
        Self {
            id: id.into(),
            script: std::sync::Mutex::new(script),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn always_succeeds(id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::new(id, vec![MockBehavior::Success(answer.into())])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(
        &self,
        _prompt: &str,
        _options: &InvokeOptions,
    ) -> Result<ModelResponse, RagError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let behavior = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        };
        match behavior {
            MockBehavior::Success(text) => Ok(ModelResponse {
                prompt_tokens: text.len() / 4,
                completion_tokens: text.len() / 4,
                text,
            }),
            MockBehavior::Transient => Err(RagError::ModelTransient {
                model_id: self.id.clone(),
                message: "mock transient failure".into(),
            }),
            MockBehavior::Permanent => Err(RagError::ModelPermanent {
                model_id: self.id.clone(),
                message: "mock permanent failure".into(),
            }),
            MockBehavior::Unavailable => Err(RagError::ModelUnavailable {
                model_id: self.id.clone(),
                message: "mock unavailable".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_success_then_repeats_last() {
        let client = MockModelClient::new(
            "m1",
            vec![MockBehavior::Transient, MockBehavior::Success("ok".into())],
        );
        let opts = InvokeOptions::default();
        assert!(client.invoke("p", &opts).await.is_err());
        let resp = client.invoke("p", &opts).await.unwrap();
        assert_eq!(resp.text, "ok");
        let resp2 = client.invoke("p", &opts).await.unwrap();
        assert_eq!(resp2.text, "ok");
        assert_eq!(client.call_count(), 3);
    }
}
