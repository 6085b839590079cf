use analysis::{Scope, StaticAnalysis, Symbol, UnresolvedIdentifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{AsRefStr, Display, EnumString};

use crate::fingerprint::Fingerprint;

/// Request options that change what an analysis produces.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisOption {
    ExternalInference,
    MemoryReuse,
}

/// Source text plus the options it is analyzed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub text: String,
    pub options: BTreeSet<AnalysisOption>,
}

impl SourceUnit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: BTreeSet::new(),
        }
    }

    pub fn with_option(mut self, option: AnalysisOption) -> Self {
        self.options.insert(option);
        self
    }

    pub fn has(&self, option: AnalysisOption) -> bool {
        self.options.contains(&option)
    }
}

/// Where a type assertion came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Provenance {
    Memory,
    ExternalInference,
    FallbackHeuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAssertion {
    pub identifier: String,
    pub inferred_type: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub provenance: Provenance,
}

/// Types proposed for the parameters and return of one unannotated
/// function. Each slot carries its own provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSuggestion {
    pub function: String,
    pub line: usize,
    pub params: Vec<TypeAssertion>,
    #[serde(default, rename = "return", skip_serializing_if = "Option::is_none")]
    pub returns: Option<TypeAssertion>,
}

impl FunctionSuggestion {
    pub fn param(&self, name: &str) -> Option<&TypeAssertion> {
        self.params.iter().find(|p| p.identifier == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub fingerprint: Fingerprint,
    pub success: bool,
    pub scopes: Vec<Scope>,
    pub symbols: Vec<Symbol>,
    pub unresolved: Vec<UnresolvedIdentifier>,
    pub assertions: Vec<TypeAssertion>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub(crate) fn from_static(fingerprint: Fingerprint, analysis: StaticAnalysis) -> Self {
        let error = analysis.error.as_ref().map(|e| e.to_string());
        Self {
            fingerprint,
            success: analysis.error.is_none(),
            scopes: analysis.scopes,
            symbols: analysis.symbols,
            unresolved: analysis.unresolved,
            assertions: Vec::new(),
            cached: false,
            error,
        }
    }

    pub fn assertion(&self, identifier: &str) -> Option<&TypeAssertion> {
        self.assertions.iter().find(|a| a.identifier == identifier)
    }

    /// The result as served from the cache.
    pub fn as_cached(&self) -> Self {
        Self {
            cached: true,
            ..self.clone()
        }
    }
}

fn yes() -> bool {
    true
}

/// Input to [`crate::AnalysisEngine::analyze`] and
/// [`crate::AnalysisEngine::annotate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub code: String,
    #[serde(default = "yes")]
    pub use_external_inference: bool,
    #[serde(default = "yes")]
    pub use_cache: bool,
    #[serde(default = "yes")]
    pub use_memory: bool,
}

impl AnalysisRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            use_external_inference: true,
            use_cache: true,
            use_memory: true,
        }
    }

    pub fn offline(mut self) -> Self {
        self.use_external_inference = false;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn without_memory(mut self) -> Self {
        self.use_memory = false;
        self
    }

    /// `use_cache` only controls cache reads, so it is not part of the unit.
    pub fn source_unit(&self) -> SourceUnit {
        let mut unit = SourceUnit::new(self.code.clone());
        if self.use_external_inference {
            unit.options.insert(AnalysisOption::ExternalInference);
        }
        if self.use_memory {
            unit.options.insert(AnalysisOption::MemoryReuse);
        }
        unit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResult {
    pub success: bool,
    pub fingerprint: Fingerprint,
    pub original_code: String,
    pub annotated_code: String,
    pub assertions: Vec<TypeAssertion>,
    pub annotation_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_suggestions: Vec<FunctionSuggestion>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPattern {
    /// Hex SHA-256 of `shape`.
    pub signature: String,
    /// Normalized snippet the signature was computed from.
    pub shape: String,
    pub inferred_type: String,
    pub confidence: f64,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub fingerprint: Fingerprint,
    pub identifier: String,
    pub inferred_type: String,
    pub provenance: Provenance,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub analysis_results: usize,
    pub memory_patterns: usize,
    pub history_records: usize,
    pub in_flight: usize,
    pub total_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    /// `None` when the whole cache was cleared.
    pub fingerprint: Option<Fingerprint>,
    pub analysis_results: usize,
    pub memory_patterns: usize,
    pub history_records: usize,
}

impl ClearReport {
    pub fn total(&self) -> usize {
        self.analysis_results + self.memory_patterns + self.history_records
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    /// `confidence >= 0.8`
    pub high: usize,
    /// `0.5 <= confidence < 0.8`
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternUsage {
    pub shape: String,
    pub inferred_type: String,
    pub hit_count: u64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub total_patterns: usize,
    pub total_inferences: usize,
    /// Share of history records answered by the external service.
    pub external_rate: f64,
    pub confidence_distribution: ConfidenceDistribution,
    pub most_used_patterns: Vec<PatternUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub total_patterns: usize,
    pub total_history_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryExport {
    pub version: String,
    pub export_time: DateTime<Utc>,
    pub patterns: Vec<MemoryPattern>,
    pub history: Vec<HistoryRecord>,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub version: String,
    pub storage_backend: String,
    pub inference: Option<inference::ModelStatus>,
    pub cache: CacheStats,
}
