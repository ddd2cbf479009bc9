//! Storage backend trait and implementations

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Result, StoreError};

/// Abstract key-value storage used by the valuation store
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Local file-based storage backend: one JSON file per key
pub struct LocalStorage {
    data_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend, creating the data directory if needed
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(StoreError::Io)?;

        tracing::info!("Local storage backend initialized at: {:?}", data_dir);

        Ok(Self { data_dir })
    }

    /// Get the data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.data_dir.join(format!("{file_name}.json"))
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        // Write then rename so a crash never leaves a half-written record
        tokio::fs::write(&tmp_path, value).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// In-memory storage backend (for testing and storage-less contexts)
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStorage {
    /// Create a new, empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no keys are stored
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();

        assert_eq!(storage.get("nav-engine/portfolio").await.unwrap(), None);

        storage.set("nav-engine/portfolio", "{\"a\":1}").await.unwrap();
        assert_eq!(
            storage.get("nav-engine/portfolio").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(temp_dir.path().join("nav-engine_portfolio.json").exists());

        storage.remove("nav-engine/portfolio").await.unwrap();
        assert_eq!(storage.get("nav-engine/portfolio").await.unwrap(), None);

        // removing twice is fine
        storage.remove("nav-engine/portfolio").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        let storage = LocalStorage::new(&nested).unwrap();
        assert!(storage.data_dir().exists());
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();
        assert!(storage.is_empty().await);

        storage.set("k", "v").await.unwrap();
        assert_eq!(storage.len().await, 1);
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));

        let clone = storage.clone();
        clone.remove("k").await.unwrap();
        assert!(storage.is_empty().await);
    }

    #[test]
    fn test_in_memory_storage_outside_runtime() {
        let storage = InMemoryStorage::new();
        tokio_test::block_on(async {
            storage.set("nav-engine/reference", "1000").await.unwrap();
            assert_eq!(storage.get("nav-engine/reference").await.unwrap().as_deref(), Some("1000"));
        });
    }
}
