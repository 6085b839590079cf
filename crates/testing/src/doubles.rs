use async_trait::async_trait;
use inference::{InferenceClient, InferenceError, ModelStatus, Prompt};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Replies with canned completions, in order. The last reply repeats once
/// the script runs out.
pub struct ScriptedInference {
    replies: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedInference {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps before every reply, ignoring the caller's timeout.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, prompt: &Prompt, _timeout: Duration) -> Result<String, InferenceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        debug!(call, "Scripted inference called");

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        Ok(reply)
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Timeout,
    Transport(String),
}

/// Fails every call the same way.
pub struct FailingInference {
    failure: Failure,
    calls: AtomicUsize,
}

impl FailingInference {
    pub fn timeout() -> Self {
        Self {
            failure: Failure::Timeout,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            failure: Failure::Transport(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for FailingInference {
    fn name(&self) -> &str {
        "failing"
    }

    async fn infer(&self, _prompt: &Prompt, timeout: Duration) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(match &self.failure {
            Failure::Timeout => InferenceError::Timeout(timeout),
            Failure::Transport(message) => InferenceError::Transport(message.clone()),
        })
    }

    async fn status(&self) -> ModelStatus {
        ModelStatus {
            client: self.name().to_string(),
            model: "unavailable".to_string(),
            available: false,
            installed_models: Vec::new(),
            error: Some(match &self.failure {
                Failure::Timeout => "timed out".to_string(),
                Failure::Transport(message) => message.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt::new("system", "user")
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order_then_repeat() {
        let client = ScriptedInference::new(["first", "second"]);
        let timeout = Duration::from_secs(1);
        assert_eq!(client.infer(&prompt(), timeout).await.unwrap(), "first");
        assert_eq!(client.infer(&prompt(), timeout).await.unwrap(), "second");
        assert_eq!(client.infer(&prompt(), timeout).await.unwrap(), "second");
        assert_eq!(client.calls(), 3);
        assert_eq!(client.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_failing() {
        let client = FailingInference::timeout();
        let error = client
            .infer(&prompt(), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(error, InferenceError::Timeout(Duration::from_millis(10)));
        assert!(!client.status().await.available);
        assert_eq!(client.calls(), 1);
    }
}
