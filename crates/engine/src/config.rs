use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Policy values for the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence given to structured answers that omit one.
    pub default_confidence: f64,
    /// Confidence given to answers recovered by line heuristics.
    pub fallback_confidence: f64,
    /// Minimum stored confidence for a memory hit to replace the external call.
    pub reuse_threshold: f64,
    pub inference_timeout_ms: u64,
    /// Record interpreted assertions into pattern memory.
    pub record_memory: bool,
    /// Default number of records returned by history listings.
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.6,
            fallback_confidence: 0.3,
            reuse_threshold: 0.75,
            inference_timeout_ms: 60_000,
            record_memory: true,
            history_limit: 100,
        }
    }
}

impl EngineConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout_ms = (timeout.as_millis() as u64).max(1);
        self
    }

    pub fn with_record_memory(mut self, record: bool) -> Self {
        self.record_memory = record;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("default_confidence", self.default_confidence),
            ("fallback_confidence", self.fallback_confidence),
            ("reuse_threshold", self.reuse_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        if self.inference_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("inference_timeout_ms"));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::NotPositive("history_limit"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.inference_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let config = EngineConfig {
            reuse_threshold: 1.5,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "reuse_threshold",
                value: 1.5
            })
        );

        let config = EngineConfig {
            inference_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("inference_timeout_ms"))
        );
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"reuse_threshold": 0.9}"#).unwrap();
        assert_eq!(config.reuse_threshold, 0.9);
        assert_eq!(config.default_confidence, 0.6);
    }
}
