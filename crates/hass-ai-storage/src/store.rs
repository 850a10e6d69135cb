//! `.storage/` directory access with versioned envelopes

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Versioned envelope written to disk
///
/// ```json
/// { "version": 1, "minor_version": 1, "key": "hass_ai_ai_results", "data": { ... } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    #[serde(default = "default_minor_version")]
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

fn default_minor_version() -> u32 {
    1
}

/// A record type with a fixed storage key and schema version
pub trait Storable: Serialize + DeserializeOwned + Default {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32 = 1;
}

/// Handle on the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Storage rooted at `<data_dir>/.storage`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: data_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    /// Read the raw envelope for `key`; `None` when the file is missing
    pub async fn load_raw(&self, key: &str) -> StorageResult<Option<StorageFile<Value>>> {
        let path = self.file_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "storage file not found");
                return Ok(None);
            }
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let file = serde_json::from_str(&content).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(file))
    }

    /// Load a record, treating a missing file as the empty record
    ///
    /// A schema version other than `T::VERSION` is logged and decoded on a
    /// best-effort basis; data that no longer fits the type yields the
    /// empty record instead of an error.
    pub async fn load<T: Storable>(&self) -> StorageResult<T> {
        let Some(file) = self.load_raw(T::KEY).await? else {
            return Ok(T::default());
        };

        if file.version != T::VERSION {
            warn!(
                key = T::KEY,
                found = file.version,
                expected = T::VERSION,
                "storage schema version mismatch"
            );
            return Ok(serde_json::from_value(file.data).unwrap_or_else(|e| {
                warn!(key = T::KEY, error = %e, "discarding incompatible stored data");
                T::default()
            }));
        }

        if file.minor_version < T::MINOR_VERSION {
            debug!(
                key = T::KEY,
                found = file.minor_version,
                expected = T::MINOR_VERSION,
                "storage minor version is older"
            );
        }

        serde_json::from_value(file.data).map_err(|source| StorageError::Json {
            key: T::KEY.to_string(),
            source,
        })
    }

    /// Write a record atomically (temp file then rename)
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        let file = StorageFile {
            version: T::VERSION,
            minor_version: T::MINOR_VERSION,
            key: T::KEY.to_string(),
            data,
        };
        self.write(T::KEY, &file).await
    }

    async fn write<S: Serialize>(&self, key: &str, file: &S) -> StorageResult<()> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        fs::create_dir_all(&self.storage_dir).await.map_err(io_err)?;

        let content = serde_json::to_string_pretty(file).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        let path = self.file_path(key);
        let temp_path = self.file_path(&format!("{key}.tmp"));

        fs::write(&temp_path, content).await.map_err(io_err)?;
        fs::rename(&temp_path, &path).await.map_err(io_err)?;

        debug!(key, "saved storage file");
        Ok(())
    }

    /// Remove a record; missing files are not an error
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => {
                debug!(key, "deleted storage file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        name: String,
        hits: u32,
    }

    impl Storable for Counter {
        const KEY: &'static str = "test_counter";
        const VERSION: u32 = 1;
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let loaded: Counter = storage.load().await.unwrap();
        assert_eq!(loaded, Counter::default());
        assert!(!storage.exists(Counter::KEY).await);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        let data = Counter {
            name: "scan".into(),
            hits: 3,
        };

        storage.save(&data).await.unwrap();
        assert!(storage.exists("test_counter").await);
        assert!(!storage.exists("test_counter.tmp").await);

        let raw = storage.load_raw("test_counter").await.unwrap().unwrap();
        assert_eq!(raw.version, 1);
        assert_eq!(raw.key, "test_counter");

        let loaded: Counter = storage.load().await.unwrap();
        assert_eq!(loaded, data);
    }

    #[tokio::test]
    async fn test_version_mismatch_reads_best_effort() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        std::fs::create_dir_all(storage.storage_dir()).unwrap();

        std::fs::write(
            storage.file_path("test_counter"),
            r#"{"version": 2, "key": "test_counter", "data": {"name": "old", "hits": 7}}"#,
        )
        .unwrap();
        let loaded: Counter = storage.load().await.unwrap();
        assert_eq!(loaded.hits, 7);

        std::fs::write(
            storage.file_path("test_counter"),
            r#"{"version": 2, "key": "test_counter", "data": [1, 2, 3]}"#,
        )
        .unwrap();
        let loaded: Counter = storage.load().await.unwrap();
        assert_eq!(loaded, Counter::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        std::fs::create_dir_all(storage.storage_dir()).unwrap();
        std::fs::write(storage.file_path("test_counter"), "not json").unwrap();

        let result: StorageResult<Counter> = storage.load().await;
        assert!(matches!(result, Err(StorageError::Json { .. })));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        storage.save(&Counter::default()).await.unwrap();

        storage.delete("test_counter").await.unwrap();
        storage.delete("test_counter").await.unwrap();
        assert!(!storage.exists("test_counter").await);
    }
}
