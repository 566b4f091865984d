//! Local key/value cache for values that must survive an app restart: the
//! resolved sample assignment and the auth-session marker.

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Cache key holding the assigned sample id.
pub const ASSIGNED_SAMPLE_KEY: &str = "assignedSampleId";

/// Cache key holding the signed-in user id.
pub const AUTH_TOKEN_KEY: &str = "authToken";

// ---

#[async_trait]
pub trait LocalCache: Send + Sync {
    // ---
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    /// Drop every entry.
    async fn clear(&self) -> Result<()>;
}

/// Process-local cache; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl LocalCache for MemoryCache {
    // ---
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// Cache persisted as a single JSON object on disk.
///
/// Every operation reads and rewrites the whole file under one lock; the
/// cache holds a handful of short strings.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    // ---
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt cache file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    async fn store(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

#[async_trait]
impl LocalCache for FileCache {
    // ---
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.store(&entries).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store(&BTreeMap::new()).await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn temp_cache_path() -> PathBuf {
        std::env::temp_dir().join(format!("carhealth-cache-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_memory_cache_set_get_remove() {
        // ---
        let cache = MemoryCache::default();
        assert_eq!(cache.get(ASSIGNED_SAMPLE_KEY).await.unwrap(), None);

        cache.set(ASSIGNED_SAMPLE_KEY, "sample-3").await.unwrap();
        assert_eq!(
            cache.get(ASSIGNED_SAMPLE_KEY).await.unwrap().as_deref(),
            Some("sample-3")
        );

        cache.remove(ASSIGNED_SAMPLE_KEY).await.unwrap();
        assert_eq!(cache.get(ASSIGNED_SAMPLE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cache_persists_across_instances() {
        // ---
        let path = temp_cache_path();

        let cache = FileCache::new(&path);
        cache.set(AUTH_TOKEN_KEY, "uid-42").await.unwrap();
        cache.set(ASSIGNED_SAMPLE_KEY, "sample-9").await.unwrap();
        drop(cache);

        let reopened = FileCache::new(&path);
        assert_eq!(
            reopened.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(),
            Some("uid-42")
        );

        reopened.clear().await.unwrap();
        assert_eq!(reopened.get(ASSIGNED_SAMPLE_KEY).await.unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_file_cache_missing_file_is_empty() {
        // ---
        let cache = FileCache::new(temp_cache_path());
        assert_eq!(cache.get(AUTH_TOKEN_KEY).await.unwrap(), None);
        cache.remove(AUTH_TOKEN_KEY).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_corrupt_file_is_an_error() {
        // ---
        let path = temp_cache_path();
        std::fs::write(&path, b"not json").unwrap();

        let cache = FileCache::new(&path);
        assert!(cache.get(AUTH_TOKEN_KEY).await.is_err());

        let _ = std::fs::remove_file(&path);
    }
}
