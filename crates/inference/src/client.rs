use crate::{InferenceError, Prompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Availability of the backing model, as reported by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub client: String,
    pub model: String,
    pub available: bool,
    pub installed_models: Vec<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    fn name(&self) -> &str;

    /// Sends `prompt` and returns the raw completion text.
    async fn infer(&self, prompt: &Prompt, timeout: Duration) -> Result<String, InferenceError>;

    async fn status(&self) -> ModelStatus {
        ModelStatus {
            client: self.name().to_string(),
            model: self.name().to_string(),
            available: true,
            installed_models: Vec::new(),
            error: None,
        }
    }
}
