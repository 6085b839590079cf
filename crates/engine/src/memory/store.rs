use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::cmp::Reverse;
use std::sync::Arc;
use storage::KeyValueStore;
use tracing::{debug, info};

use super::Signature;
use crate::error::{AnalysisFailure, EngineError};
use crate::types::{
    ConfidenceDistribution, HistoryRecord, MemoryPattern, MemoryStatistics, PatternUsage,
    Provenance,
};

const PREFIX: &str = "memory/";

fn key(signature: &str) -> String {
    format!("{PREFIX}{signature}")
}

/// Reusable `signature -> type` patterns learned from earlier analyses.
///
/// Patterns are held in a `DashMap` and written through to the key-value
/// store while the entry lock for their signature is held.
pub struct MemoryStore {
    patterns: DashMap<String, MemoryPattern>,
    store: Arc<dyn KeyValueStore>,
}

impl MemoryStore {
    /// Loads every persisted pattern.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, EngineError> {
        let patterns = DashMap::new();
        for (_, bytes) in store.scan_prefix(PREFIX)? {
            let pattern: MemoryPattern = serde_json::from_slice(&bytes)?;
            patterns.insert(pattern.signature.clone(), pattern);
        }
        info!("Loaded {} memory patterns", patterns.len());
        Ok(Self { patterns, store })
    }

    fn persist(&self, pattern: &MemoryPattern) -> Result<(), AnalysisFailure> {
        let bytes = serde_json::to_vec(pattern)?;
        self.store.put(&key(&pattern.signature), &bytes)?;
        Ok(())
    }

    pub fn lookup(&self, signature: &Signature) -> Option<MemoryPattern> {
        self.patterns
            .get(&signature.to_hex())
            .map(|entry| entry.value().clone())
    }

    /// Folds a new observation into the pattern for `signature`.
    pub fn record(
        &self,
        signature: &Signature,
        inferred_type: &str,
        confidence: f64,
    ) -> Result<MemoryPattern, AnalysisFailure> {
        let confidence = confidence.clamp(0.0, 1.0);
        let now = Utc::now();

        match self.patterns.entry(signature.to_hex()) {
            Entry::Occupied(mut entry) => {
                let pattern = entry.get_mut();
                let (high, low) = if confidence >= pattern.confidence {
                    pattern.inferred_type = inferred_type.to_string();
                    (confidence, pattern.confidence)
                } else {
                    (pattern.confidence, confidence)
                };
                pattern.confidence = (0.75 * high + 0.25 * low).clamp(0.0, 1.0);
                pattern.hit_count += 1;
                pattern.last_used = now;
                debug!(
                    signature = %signature,
                    hit_count = pattern.hit_count,
                    "Updated memory pattern"
                );
                let pattern = pattern.clone();
                self.persist(&pattern)?;
                Ok(pattern)
            }
            Entry::Vacant(entry) => {
                let pattern = MemoryPattern {
                    signature: signature.to_hex(),
                    shape: signature.shape().to_string(),
                    inferred_type: inferred_type.to_string(),
                    confidence,
                    hit_count: 1,
                    created_at: now,
                    last_used: now,
                };
                debug!(signature = %signature, "Recorded memory pattern");
                let _guard = entry.insert(pattern.clone());
                self.persist(&pattern)?;
                Ok(pattern)
            }
        }
    }

    /// Marks a pattern as used by an analysis.
    pub fn reuse(&self, signature: &Signature) -> Result<Option<MemoryPattern>, AnalysisFailure> {
        let Some(mut entry) = self.patterns.get_mut(&signature.to_hex()) else {
            return Ok(None);
        };
        entry.hit_count += 1;
        entry.last_used = Utc::now();
        let pattern = entry.value().clone();
        self.persist(&pattern)?;
        Ok(Some(pattern))
    }

    /// Patterns whose shape or type contains `query` (case-insensitive),
    /// most used first, then most recently used.
    pub fn search(&self, query: &str, min_confidence: f64) -> Vec<MemoryPattern> {
        let query = query.to_lowercase();
        let mut found: Vec<MemoryPattern> = self
            .patterns
            .iter()
            .filter(|p| p.confidence >= min_confidence)
            .filter(|p| {
                query.is_empty()
                    || p.shape.to_lowercase().contains(&query)
                    || p.inferred_type.to_lowercase().contains(&query)
            })
            .map(|p| p.value().clone())
            .collect();
        found.sort_by_key(|p| (Reverse(p.hit_count), Reverse(p.last_used)));
        found
    }

    /// Every pattern, oldest first.
    pub fn all(&self) -> Vec<MemoryPattern> {
        let mut patterns: Vec<MemoryPattern> =
            self.patterns.iter().map(|p| p.value().clone()).collect();
        patterns.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        patterns
    }

    pub fn statistics(&self, history: &[HistoryRecord]) -> MemoryStatistics {
        let mut distribution = ConfidenceDistribution::default();
        for pattern in self.patterns.iter() {
            match pattern.confidence {
                c if c >= 0.8 => distribution.high += 1,
                c if c >= 0.5 => distribution.medium += 1,
                _ => distribution.low += 1,
            }
        }

        let external = history
            .iter()
            .filter(|h| h.provenance == Provenance::ExternalInference)
            .count();
        let external_rate = if history.is_empty() {
            0.0
        } else {
            external as f64 / history.len() as f64
        };

        let most_used_patterns = self
            .search("", 0.0)
            .into_iter()
            .take(5)
            .map(|p| PatternUsage {
                shape: p.shape,
                inferred_type: p.inferred_type,
                hit_count: p.hit_count,
                confidence: p.confidence,
            })
            .collect();

        MemoryStatistics {
            total_patterns: self.patterns.len(),
            total_inferences: history.len(),
            external_rate,
            confidence_distribution: distribution,
            most_used_patterns,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Drops every pattern and returns how many were held.
    pub fn purge(&self) -> Result<usize, AnalysisFailure> {
        let held = self.patterns.len();
        self.patterns.clear();
        let removed = self.store.delete_prefix(PREFIX)?;
        Ok(held.max(removed))
    }
}
