use crate::{InferenceClient, InferenceError, ModelStatus, Prompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection and sampling settings for an Ollama server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: 2048,
        }
    }
}

impl OllamaConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Non-streaming client for Ollama's `/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn chat_payload(&self, prompt: &Prompt) -> serde_json::Value {
        let mut messages = Vec::new();
        if !prompt.system.is_empty() {
            messages.push(json!({"role": "system", "content": prompt.system}));
        }
        messages.push(json!({"role": "user", "content": prompt.user}));

        json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "top_p": self.config.top_p,
                "num_predict": self.config.max_tokens,
            }
        })
    }

    async fn installed_models(&self) -> Result<Vec<String>, InferenceError> {
        let timeout = Duration::from_secs(5);
        let response = self
            .http
            .get(self.config.endpoint("/api/tags"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn infer(&self, prompt: &Prompt, timeout: Duration) -> Result<String, InferenceError> {
        let url = self.config.endpoint("/api/chat");
        debug!(model = %self.config.model, %url, "Sending chat request");

        let response = self
            .http
            .post(&url)
            .json(&self.chat_payload(prompt))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(code = status.as_u16(), "Ollama returned an error status");
            return Err(InferenceError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::from_reqwest(e, timeout))?;
        Ok(chat.message.map(|m| m.content).unwrap_or_default())
    }

    async fn status(&self) -> ModelStatus {
        let mut status = ModelStatus {
            client: self.name().to_string(),
            model: self.config.model.clone(),
            available: false,
            installed_models: Vec::new(),
            error: None,
        };
        match self.installed_models().await {
            Ok(models) => {
                status.available = models.iter().any(|m| m == &self.config.model);
                status.installed_models = models;
            }
            Err(e) => status.error = Some(e.to_string()),
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves a single canned HTTP response and returns the base URL.
    async fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}")
    }

    fn client(base_url: String) -> OllamaClient {
        OllamaClient::new(OllamaConfig::default().with_base_url(base_url))
    }

    #[test]
    fn test_chat_payload() {
        let client = OllamaClient::new(OllamaConfig::default());
        let payload = client.chat_payload(&Prompt::new("sys", "user"));

        assert_eq!(payload["model"], "qwen2.5-coder:7b");
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "user");
        assert_eq!(payload["options"]["num_predict"], 2048);
    }

    #[tokio::test]
    async fn test_infer_returns_message_content() {
        let url = serve_once(
            "200 OK",
            r#"{"model":"qwen2.5-coder:7b","message":{"role":"assistant","content":"{\"inferences\":{}}"}}"#,
            Duration::ZERO,
        )
        .await;

        let content = client(url)
            .infer(&Prompt::new("", "hi"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(content, r#"{"inferences":{}}"#);
    }

    #[tokio::test]
    async fn test_infer_maps_error_status() {
        let url = serve_once("500 Internal Server Error", "model crashed", Duration::ZERO).await;

        let error = client(url)
            .infer(&Prompt::new("", "hi"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(
            error,
            InferenceError::Status {
                code: 500,
                body: "model crashed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_infer_times_out() {
        let url = serve_once("200 OK", "{}", Duration::from_secs(2)).await;

        let error = client(url)
            .infer(&Prompt::new("", "hi"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(error, InferenceError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_status_reports_installed_models() {
        let url = serve_once(
            "200 OK",
            r#"{"models":[{"name":"llama3:8b"},{"name":"qwen2.5-coder:7b"}]}"#,
            Duration::ZERO,
        )
        .await;

        let status = client(url).status().await;
        assert!(status.available);
        assert_eq!(status.installed_models.len(), 2);
        assert_eq!(status.error, None);
    }

    #[tokio::test]
    async fn test_status_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let status = client(format!("http://{addr}")).status().await;
        assert!(!status.available);
        assert!(status.error.is_some());
    }
}
