use crate::{KeyValueStore, StorageError, StorageResult, prefix_end};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

/// Ordered in-process store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prefixed<'a>(
        map: &'a BTreeMap<String, Vec<u8>>,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<u8>)> + 'a {
        map.range(prefix.to_string()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
    }
}

impl KeyValueStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(Self::prefixed(&entries, prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_prefix_rev(&self, prefix: &str, limit: usize) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        let end = prefix_end(prefix);
        let upper = match &end {
            Some(end) => Bound::Excluded(end.as_str()),
            None => Bound::Unbounded,
        };
        Ok(entries
            .range::<str, _>((Bound::Included(prefix), upper))
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn count_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(Self::prefixed(&entries, prefix).count())
    }

    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        let keys: Vec<String> = Self::prefixed(&entries, prefix)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("result/a").unwrap(), None);

        store.put("result/a", b"1").unwrap();
        store.put("result/a", b"2").unwrap();
        assert_eq!(store.get("result/a").unwrap(), Some(b"2".to_vec()));

        assert!(store.delete("result/a").unwrap());
        assert!(!store.delete("result/a").unwrap());
    }

    #[test]
    fn test_prefix_operations() {
        let store = InMemoryStore::new();
        store.put("memory/b", b"b").unwrap();
        store.put("memory/a", b"a").unwrap();
        store.put("memoryx", b"x").unwrap();
        store.put("result/a", b"r").unwrap();

        let keys: Vec<_> = store
            .scan_prefix("memory/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["memory/a", "memory/b"]);
        assert_eq!(store.count_prefix("memory/").unwrap(), 2);

        assert_eq!(store.delete_prefix("memory/").unwrap(), 2);
        assert_eq!(store.count_prefix("").unwrap(), 2);
    }

    #[test]
    fn test_reverse_scan_is_limited() {
        let store = InMemoryStore::new();
        for key in ["history/1", "history/2", "history/3", "historyx", "memory/a"] {
            store.put(key, key.as_bytes()).unwrap();
        }
        let keys: Vec<_> = store
            .scan_prefix_rev("history/", 2)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["history/3", "history/2"]);
        assert_eq!(store.scan_prefix_rev("history/", 10).unwrap().len(), 3);
        assert!(store.scan_prefix_rev("history/", 0).unwrap().is_empty());
        assert_eq!(store.scan_prefix_rev("", 1).unwrap()[0].0, "memory/a");
    }
}
