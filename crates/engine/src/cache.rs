use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use storage::KeyValueStore;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::AnalysisFailure;
use crate::fingerprint::Fingerprint;
use crate::types::AnalysisResult;

const PREFIX: &str = "result/";

fn key(fingerprint: &Fingerprint) -> String {
    format!("{PREFIX}{fingerprint}")
}

type Slot = Arc<OnceCell<Arc<AnalysisResult>>>;

/// Content-addressed store of finished analyses with single-flight
/// computation.
///
/// Concurrent callers for the same fingerprint share one computation: the
/// first caller runs it, the rest await the same cell. Finished results are
/// mirrored in memory and written through to the key-value store.
pub struct ResultCache {
    ready: DashMap<Fingerprint, Arc<AnalysisResult>>,
    inflight: Mutex<HashMap<Fingerprint, Slot>>,
    store: Arc<dyn KeyValueStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            ready: DashMap::new(),
            inflight: Mutex::new(HashMap::new()),
            store,
        }
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<Fingerprint, Slot>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Finished result for `fingerprint`, falling back to the key-value store.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<AnalysisResult>> {
        if let Some(hit) = self.ready.get(fingerprint) {
            return Some(hit.value().clone());
        }

        let bytes = match self.store.get(&key(fingerprint)) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(fingerprint = %fingerprint, "Cache read failed: {e}");
                return None;
            }
        };
        match serde_json::from_slice::<AnalysisResult>(&bytes) {
            Ok(result) => {
                let result = Arc::new(result);
                self.ready.insert(*fingerprint, result.clone());
                Some(result)
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, "Discarding undecodable cache entry: {e}");
                None
            }
        }
    }

    fn insert(&self, fingerprint: Fingerprint, result: Arc<AnalysisResult>) {
        if let Err(e) = self.persist(&fingerprint, &result) {
            warn!(fingerprint = %fingerprint, "{e}");
        }
        self.ready.insert(fingerprint, result);
    }

    fn persist(&self, fingerprint: &Fingerprint, result: &AnalysisResult) -> Result<(), AnalysisFailure> {
        let bytes = serde_json::to_vec(result)?;
        self.store.put(&key(fingerprint), &bytes)?;
        Ok(())
    }

    /// Returns the cached result, or runs `compute` exactly once across all
    /// concurrent callers. The flag is `true` when this caller did not run
    /// the computation.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        compute: F,
    ) -> (Arc<AnalysisResult>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalysisResult>,
    {
        if let Some(hit) = self.get(&fingerprint) {
            return (hit, true);
        }

        let slot = {
            let mut inflight = self.inflight();
            // The runner publishes to `ready` before leaving the registry.
            if let Some(hit) = self.ready.get(&fingerprint) {
                return (hit.value().clone(), true);
            }
            inflight.entry(fingerprint).or_default().clone()
        };

        let ran = AtomicBool::new(false);
        let result = slot
            .get_or_init(|| async {
                ran.store(true, Ordering::Release);
                debug!(fingerprint = %fingerprint, "Computing analysis");
                let result = Arc::new(compute().await);
                self.insert(fingerprint, result.clone());
                result
            })
            .await
            .clone();

        let ran = ran.load(Ordering::Acquire);
        if ran {
            self.inflight().remove(&fingerprint);
        }
        (result, !ran)
    }

    /// Recomputes and replaces the entry for `fingerprint`.
    pub async fn refresh<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> Arc<AnalysisResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalysisResult>,
    {
        let result = Arc::new(compute().await);
        self.insert(fingerprint, result.clone());
        result
    }

    /// Removes one entry. Returns how many entries were removed (0 or 1).
    pub fn purge(&self, fingerprint: &Fingerprint) -> Result<usize, AnalysisFailure> {
        let in_memory = self.ready.remove(fingerprint).is_some();
        let persisted = self.store.delete(&key(fingerprint))?;
        Ok(usize::from(in_memory || persisted))
    }

    pub fn purge_all(&self) -> Result<usize, AnalysisFailure> {
        let held = self.ready.len();
        self.ready.clear();
        let removed = self.store.delete_prefix(PREFIX)?;
        Ok(held.max(removed))
    }

    /// Number of finished results, as persisted.
    pub fn len(&self) -> usize {
        match self.store.count_prefix(PREFIX) {
            Ok(count) => count.max(self.ready.len()),
            Err(e) => {
                warn!("Cache count failed: {e}");
                self.ready.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.inflight().len()
    }
}
