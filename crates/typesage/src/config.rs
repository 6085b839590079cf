//! Application configuration.
//!
//! Everything has a default; a missing, unreadable or malformed file only
//! produces a warning. The data directory holds the SQLite database, the
//! logs and, by default, `config.toml`.

use anyhow::{Result, anyhow};
use engine::EngineConfig;
use inference::OllamaConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use storage::StorageConfig;
use tracing::warn;

const DATA_DIR_NAME: &str = ".typesage";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "typesage.db";
const LOGS_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: Option<PathBuf>,
    pub engine: EngineConfig,
    /// Defaults to a SQLite database inside the data directory.
    pub storage: Option<StorageConfig>,
    pub ollama: OllamaConfig,
}

pub fn default_data_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .ok_or_else(|| anyhow!("Could not find home directory"))
}

/// Log directory, known before the configuration file is read.
pub fn logs_dir(data_dir: Option<&Path>) -> Result<PathBuf> {
    let data_dir = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_data_dir()?,
    };
    Ok(data_dir.join(LOGS_DIR_NAME))
}

impl AppConfig {
    fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads `path`, falling back to defaults with a warning.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Could not read {}: {e}. Using defaults.", path.display());
                return Self::default();
            }
        };
        Self::parse(&contents).unwrap_or_else(|e| {
            warn!("Could not parse {}: {e}. Using defaults.", path.display());
            Self::default()
        })
    }

    /// Loads the configuration named on the command line, or the one in
    /// the data directory, and applies the `--data-dir` override.
    pub fn resolve(config: Option<&Path>, data_dir: Option<&Path>) -> Result<Self> {
        let config_path = match (config, data_dir) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(dir)) => dir.join(CONFIG_FILE_NAME),
            (None, None) => default_data_dir()?.join(CONFIG_FILE_NAME),
        };
        let mut app = Self::load(&config_path);
        if let Some(dir) = data_dir {
            app.data_dir = Some(dir.to_path_buf());
        }
        Ok(app)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    pub fn storage(&self) -> Result<StorageConfig> {
        let data_dir = self.data_dir()?;
        Ok(match &self.storage {
            Some(storage) => storage.clone().with_base_dir(&data_dir),
            None => StorageConfig::sqlite(data_dir.join(DATABASE_FILE_NAME)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::StorageBackend;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let app = AppConfig::parse(
            r#"
[engine]
reuse_threshold = 0.9

[ollama]
model = "llama3"

[storage]
backend = "memory"
"#,
        )
        .unwrap();
        assert_eq!(app.engine.reuse_threshold, 0.9);
        assert_eq!(app.engine.default_confidence, 0.6);
        assert_eq!(app.ollama.model, "llama3");
        assert_eq!(app.ollama.base_url, "http://localhost:11434");
        assert_eq!(app.storage, Some(StorageConfig::memory()));
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[engine\nreuse_threshold = ").unwrap();
        assert_eq!(AppConfig::load(&path), AppConfig::default());
        assert_eq!(
            AppConfig::load(&dir.path().join("missing.toml")),
            AppConfig::default()
        );
    }

    #[test]
    fn test_data_dir_override_and_storage() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[storage]\nbackend = \"sqlite\"\npath = \"cache.db\"\n",
        )
        .unwrap();

        let app = AppConfig::resolve(None, Some(dir.path())).unwrap();
        assert_eq!(app.data_dir().unwrap(), dir.path());
        assert_eq!(
            app.storage().unwrap().backend,
            StorageBackend::Sqlite {
                path: dir.path().join("cache.db")
            }
        );

        let app = AppConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(
            app.storage().unwrap(),
            StorageConfig::sqlite(dir.path().join(DATABASE_FILE_NAME))
        );
        assert_eq!(logs_dir(Some(dir.path())).unwrap(), dir.path().join("logs"));
    }
}
