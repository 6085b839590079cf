//! Analysis cache and semi-parametric memory engine.
//!
//! [`AnalysisEngine`] fingerprints a request, serves repeated requests from
//! the content-addressed [`ResultCache`], and otherwise runs the
//! [`Pipeline`]: static scope analysis, reusable patterns from
//! [`MemoryStore`], and a single batched call to the external inference
//! service for whatever is still unresolved.

pub mod annotate;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod interpreter;
pub mod memory;
pub mod pipeline;
pub mod service;
pub mod types;

pub use annotate::annotate_source;
pub use cache::ResultCache;
pub use config::{ConfigError, EngineConfig};
pub use error::{AnalysisFailure, EngineError};
pub use fingerprint::Fingerprint;
pub use history::HistoryLog;
pub use interpreter::{Candidate, FunctionCandidate, Interpretation, ResponseInterpreter};
pub use memory::{MemoryStore, Signature};
pub use pipeline::{Pipeline, Stage};
pub use service::{AnalysisEngine, EXPORT_VERSION};
pub use types::*;
