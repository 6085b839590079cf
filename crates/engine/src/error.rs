use python_ast::ParseError;
use storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while constructing or administering the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),
    #[error(transparent)]
    Analysis(#[from] AnalysisFailure),
}

/// Why an analysis came back degraded or failed.
///
/// Only [`AnalysisFailure::Parse`] turns a result into `success = false`;
/// the others leave whatever assertions could still be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisFailure {
    #[error("Parse error at {0}")]
    Parse(ParseError),
    #[error("External inference unavailable: {0}")]
    ExternalUnavailable(String),
    #[error("Inference response could not be interpreted: {0}")]
    ResponseUnparseable(String),
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl From<StorageError> for AnalysisFailure {
    fn from(error: StorageError) -> Self {
        AnalysisFailure::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for AnalysisFailure {
    fn from(error: serde_json::Error) -> Self {
        AnalysisFailure::Persistence(error.to_string())
    }
}
