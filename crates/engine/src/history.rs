use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use storage::KeyValueStore;

use crate::error::AnalysisFailure;
use crate::types::HistoryRecord;

const PREFIX: &str = "history/";

/// Append-only log of every assertion an analysis produced.
///
/// Keys sort by timestamp, then by a per-process sequence number, so a
/// prefix scan returns records oldest first.
pub struct HistoryLog {
    store: Arc<dyn KeyValueStore>,
    sequence: AtomicU64,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            sequence: AtomicU64::new(0),
        }
    }

    fn key(&self, record: &HistoryRecord) -> String {
        let nanos = record
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{PREFIX}{nanos:020}-{seq:010}")
    }

    pub fn append(&self, records: &[HistoryRecord]) -> Result<usize, AnalysisFailure> {
        for record in records {
            let bytes = serde_json::to_vec(record)?;
            self.store.put(&self.key(record), &bytes)?;
        }
        Ok(records.len())
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Result<Vec<HistoryRecord>, AnalysisFailure> {
        self.store
            .scan_prefix(PREFIX)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(AnalysisFailure::from))
            .collect()
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, AnalysisFailure> {
        self.store
            .scan_prefix_rev(PREFIX, limit)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(AnalysisFailure::from))
            .collect()
    }

    pub fn count(&self) -> Result<usize, AnalysisFailure> {
        Ok(self.store.count_prefix(PREFIX)?)
    }

    pub fn purge(&self) -> Result<usize, AnalysisFailure> {
        Ok(self.store.delete_prefix(PREFIX)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::types::{Provenance, SourceUnit};
    use chrono::Utc;
    use storage::InMemoryStore;

    fn record(identifier: &str) -> HistoryRecord {
        HistoryRecord {
            fingerprint: Fingerprint::of(&SourceUnit::new("x = y")),
            identifier: identifier.to_string(),
            inferred_type: "int".to_string(),
            provenance: Provenance::ExternalInference,
            confidence: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_list() {
        let log = HistoryLog::new(Arc::new(InMemoryStore::new()));
        let at = Utc::now();
        let records: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|id| HistoryRecord {
                timestamp: at,
                ..record(id)
            })
            .collect();

        assert_eq!(log.append(&records).unwrap(), 3);
        assert_eq!(log.count().unwrap(), 3);

        let all: Vec<_> = log.all().unwrap().into_iter().map(|r| r.identifier).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let recent: Vec<_> = log
            .recent(2)
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(recent, vec!["c", "b"]);
    }

    #[test]
    fn test_purge() {
        let log = HistoryLog::new(Arc::new(InMemoryStore::new()));
        log.append(&[record("a")]).unwrap();
        assert_eq!(log.purge().unwrap(), 1);
        assert!(log.all().unwrap().is_empty());
    }

    #[test]
    fn test_recent_reads_only_the_newest_records() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put("history/00000000000000000000-0000000000", b"not json")
            .unwrap();
        let log = HistoryLog::new(store);
        log.append(&[record("a"), record("b")]).unwrap();

        let recent: Vec<_> = log
            .recent(2)
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(recent, vec!["b", "a"]);
        assert!(log.all().is_err());
        assert!(log.recent(3).is_err());
    }
}
