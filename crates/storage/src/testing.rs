//! Store doubles for exercising persistence failures.

use crate::{KeyValueStore, StorageError, StorageResult};

/// A store whose every operation fails.
#[derive(Debug, Default)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn error() -> StorageError {
        StorageError::Unavailable("store is offline".to_string())
    }
}

impl KeyValueStore for UnavailableStore {
    fn backend(&self) -> &'static str {
        "unavailable"
    }

    fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
        Err(Self::error())
    }

    fn put(&self, _key: &str, _value: &[u8]) -> StorageResult<()> {
        Err(Self::error())
    }

    fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(Self::error())
    }

    fn scan_prefix(&self, _prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Err(Self::error())
    }

    fn scan_prefix_rev(&self, _prefix: &str, _limit: usize) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Err(Self::error())
    }

    fn delete_prefix(&self, _prefix: &str) -> StorageResult<usize> {
        Err(Self::error())
    }
}
