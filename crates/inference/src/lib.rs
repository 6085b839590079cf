//! External type inference.
//!
//! [`InferenceClient`] is the seam the engine calls through; [`OllamaClient`]
//! talks to a local Ollama server over its chat API.

pub mod client;
pub mod error;
pub mod ollama;
pub mod prompt;

pub use client::{InferenceClient, ModelStatus};
pub use error::InferenceError;
pub use ollama::{OllamaClient, OllamaConfig};
pub use prompt::{FunctionTarget, Prompt, PromptTarget};
