use crate::{InMemoryStore, KeyValueStore, SqliteStore, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which backend holds the data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// Single-file SQLite database.
    Sqlite { path: PathBuf },
}

/// Storage configuration options
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(flatten)]
    pub backend: StorageBackend,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
        }
    }

    pub fn sqlite<P: AsRef<Path>>(path: P) -> Self {
        Self {
            backend: StorageBackend::Sqlite {
                path: path.as_ref().to_path_buf(),
            },
        }
    }

    /// Relative sqlite paths are resolved against `dir`.
    pub fn with_base_dir(mut self, dir: &Path) -> Self {
        if let StorageBackend::Sqlite { path } = &mut self.backend
            && path.is_relative()
        {
            *path = dir.join(&*path);
        }
        self
    }

    pub fn open(&self) -> StorageResult<Arc<dyn KeyValueStore>> {
        Ok(match &self.backend {
            StorageBackend::Memory => Arc::new(InMemoryStore::new()),
            StorageBackend::Sqlite { path } => Arc::new(SqliteStore::open(path)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::Memory);
        assert_eq!(config.open().unwrap().backend(), "memory");
    }

    #[test]
    fn test_deserialize_sqlite() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"backend": "sqlite", "path": "cache.db"}"#).unwrap();
        assert_eq!(config, StorageConfig::sqlite("cache.db"));

        let resolved = config.with_base_dir(Path::new("/var/lib/typesage"));
        assert_eq!(
            resolved.backend,
            StorageBackend::Sqlite {
                path: PathBuf::from("/var/lib/typesage/cache.db")
            }
        );
    }

    #[test]
    fn test_open_sqlite_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::sqlite("store.db").with_base_dir(dir.path());
        let store = config.open().unwrap();
        assert_eq!(store.backend(), "sqlite");
        assert!(dir.path().join("store.db").exists());
    }
}
