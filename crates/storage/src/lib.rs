//! Durable key-value storage behind a small trait.
//!
//! Keys are UTF-8 strings grouped by prefix (`result/`, `memory/`,
//! `history/`); values are opaque bytes, typically JSON documents.

pub mod config;
pub mod error;
pub mod memory;
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{StorageBackend, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Byte-valued store with prefix scans.
///
/// Implementations must be safe to share across threads. Scans return
/// entries in ascending key order.
pub trait KeyValueStore: Send + Sync {
    /// Human-readable backend name for status output.
    fn backend(&self) -> &'static str;

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Returns whether a value was present.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// The last `limit` entries under `prefix`, in descending key order.
    /// Entries past the limit are never read.
    fn scan_prefix_rev(&self, prefix: &str, limit: usize) -> StorageResult<Vec<(String, Vec<u8>)>>;

    fn count_prefix(&self, prefix: &str) -> StorageResult<usize> {
        Ok(self.scan_prefix(prefix)?.len())
    }

    /// Removes every key under `prefix` and returns how many were removed.
    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize>;
}

/// Smallest string greater than every key that starts with `prefix`, or
/// `None` when no such bound exists.
pub(crate) fn prefix_end(prefix: &str) -> Option<String> {
    let mut end = prefix.to_string();
    while let Some(last) = end.pop() {
        let next = (last as u32 + 1..=char::MAX as u32).find_map(char::from_u32);
        if let Some(next) = next {
            end.push(next);
            return Some(end);
        }
    }
    None
}
