use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl InferenceError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            InferenceError::Timeout(timeout)
        } else if error.is_decode() {
            InferenceError::Decode(error.to_string())
        } else {
            InferenceError::Transport(error.to_string())
        }
    }
}
