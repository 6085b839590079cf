use chrono::Utc;
use inference::InferenceClient;
use std::sync::Arc;
use storage::KeyValueStore;
use tracing::{info, warn};

use crate::annotate::annotate_source;
use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fingerprint::Fingerprint;
use crate::history::HistoryLog;
use crate::memory::MemoryStore;
use crate::pipeline::{Pipeline, Stage};
use crate::types::{
    AnalysisRequest, AnalysisResult, AnnotationResult, CacheStats, ClearReport, ExportMetadata,
    HistoryRecord, MemoryExport, MemoryPattern, MemoryStatistics, ServiceStatus,
};

pub const EXPORT_VERSION: &str = "1.0";

/// The public face of the engine. Cheap to share behind an `Arc`.
pub struct AnalysisEngine {
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    cache: ResultCache,
    memory: Arc<MemoryStore>,
    history: HistoryLog,
    pipeline: Pipeline,
}

impl AnalysisEngine {
    /// Validates `config` and loads the persisted pattern memory.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        client: Option<Arc<dyn InferenceClient>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let memory = Arc::new(MemoryStore::load(store.clone())?);
        info!(
            backend = store.backend(),
            external = client.is_some(),
            "Analysis engine ready"
        );
        Ok(Self {
            cache: ResultCache::new(store.clone()),
            history: HistoryLog::new(store.clone()),
            pipeline: Pipeline::new(config.clone(), memory.clone(), client),
            memory,
            store,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let unit = request.source_unit();
        let fingerprint = Fingerprint::of(&unit);
        Stage::Fingerprinted.emit(&fingerprint);

        let (result, cached) = if request.use_cache {
            Stage::CacheChecked.emit(&fingerprint);
            self.cache
                .get_or_compute(fingerprint, || self.pipeline.run(&unit, fingerprint))
                .await
        } else {
            let result = self
                .cache
                .refresh(fingerprint, || self.pipeline.run(&unit, fingerprint))
                .await;
            (result, false)
        };

        if cached {
            Stage::CacheHit.emit(&fingerprint);
            return result.as_cached();
        }
        Stage::Cached.emit(&fingerprint);

        self.pipeline.learn(&result);
        let records = Pipeline::history_records(&result);
        if let Err(e) = self.history.append(&records) {
            warn!(fingerprint = %fingerprint, "{e}");
        }
        Stage::HistoryLogged.emit(&fingerprint);

        info!(
            fingerprint = %fingerprint.short(),
            unresolved = result.unresolved.len(),
            assertions = result.assertions.len(),
            "Analysis complete"
        );
        AnalysisResult::clone(&result)
    }

    /// Analyzes the request and rewrites its source with type annotations.
    ///
    /// Unannotated functions additionally get parameter and return
    /// suggestions from pattern memory and the external service, under the
    /// same options and timeout as the analysis.
    pub async fn annotate(&self, request: &AnalysisRequest) -> AnnotationResult {
        let result = self.analyze(request).await;
        let (function_suggestions, failure) = if result.success {
            self.pipeline
                .suggest_functions(&request.source_unit(), &result)
                .await
        } else {
            (Vec::new(), None)
        };
        let (annotated_code, annotation_count) =
            annotate_source(&request.code, &result, &function_suggestions);
        AnnotationResult {
            success: result.success,
            fingerprint: result.fingerprint,
            original_code: request.code.clone(),
            annotated_code,
            annotation_count,
            function_suggestions,
            cached: result.cached,
            error: result.error.or_else(|| failure.map(|e| e.to_string())),
            assertions: result.assertions,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let analysis_results = self.cache.len();
        let memory_patterns = self.memory.len();
        let history_records = self.history.count().unwrap_or_else(|e| {
            warn!("History count failed: {e}");
            0
        });
        CacheStats {
            analysis_results,
            memory_patterns,
            history_records,
            in_flight: self.cache.in_flight(),
            total_entries: analysis_results + memory_patterns + history_records,
        }
    }

    /// Clears one cached result, or everything the engine has persisted
    /// when `fingerprint` is `None`.
    pub fn cache_clear(&self, fingerprint: Option<&Fingerprint>) -> Result<ClearReport, EngineError> {
        let report = match fingerprint {
            Some(fingerprint) => ClearReport {
                fingerprint: Some(*fingerprint),
                analysis_results: self.cache.purge(fingerprint)?,
                memory_patterns: 0,
                history_records: 0,
            },
            None => ClearReport {
                fingerprint: None,
                analysis_results: self.cache.purge_all()?,
                memory_patterns: self.memory.purge()?,
                history_records: self.history.purge()?,
            },
        };
        info!(
            analysis_results = report.analysis_results,
            memory_patterns = report.memory_patterns,
            history_records = report.history_records,
            "Cache cleared"
        );
        Ok(report)
    }

    pub fn memory_search(&self, query: &str, min_confidence: f64) -> Vec<MemoryPattern> {
        self.memory.search(query, min_confidence)
    }

    pub fn memory_export(&self) -> Result<MemoryExport, EngineError> {
        let patterns = self.memory.all();
        let history = self.history.all()?;
        Ok(MemoryExport {
            version: EXPORT_VERSION.to_string(),
            export_time: Utc::now(),
            metadata: ExportMetadata {
                total_patterns: patterns.len(),
                total_history_records: history.len(),
            },
            patterns,
            history,
        })
    }

    pub fn memory_statistics(&self) -> Result<MemoryStatistics, EngineError> {
        let history = self.history.all()?;
        Ok(self.memory.statistics(&history))
    }

    /// Newest history records first; `limit` defaults to the configured
    /// `history_limit`.
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<HistoryRecord>, EngineError> {
        let limit = limit.unwrap_or(self.config.history_limit);
        Ok(self.history.recent(limit)?)
    }

    pub async fn status(&self) -> ServiceStatus {
        let inference = match self.pipeline.client() {
            Some(client) => Some(client.status().await),
            None => None,
        };
        ServiceStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage_backend: self.store.backend().to_string(),
            inference,
            cache: self.cache_stats(),
        }
    }
}
