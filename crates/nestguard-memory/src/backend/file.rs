//! File-based store backend for persistent storage
//!
//! Stores every collection in a single JSON file. Changes are written
//! immediately so settings, pending approvals and the audit trail survive a
//! restart.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use nestguard_core::{NestError, NestResult, Store, StoreEntry};
use tokio::sync::{Mutex, RwLock};

type Collections = HashMap<String, BTreeMap<String, StoreEntry>>;

/// File-based store backend
///
/// ## Example
///
/// ```rust,no_run
/// use nestguard_memory::FileStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FileStore::new("./nestguard.json").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FileStore {
    /// Path to the JSON file
    path: PathBuf,
    /// In-memory cache of all collections
    cache: Arc<RwLock<Collections>>,
    /// Serializes file writes
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing documents if the file exists
    pub async fn new(path: impl Into<PathBuf>) -> NestResult<Self> {
        let path = path.into();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    NestError::store(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let cache: Collections = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                NestError::store(format!("Failed to read store file {}: {}", path.display(), e))
            })?;

            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    NestError::store(format!(
                        "Failed to parse store file {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        } else {
            HashMap::new()
        };

        tracing::debug!(
            "Opened file store {} with {} collections",
            path.display(),
            cache.len()
        );

        Ok(Self {
            path,
            cache: Arc::new(RwLock::new(cache)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Persist current cache to file
    async fn persist(&self) -> NestResult<()> {
        let _guard = self.write_lock.lock().await;
        let cache = self.cache.read().await;
        let content = serde_json::to_string_pretty(&*cache)
            .map_err(|e| NestError::store(format!("Failed to serialize store: {}", e)))?;
        drop(cache);

        // Write a sibling file, then rename it over the original
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await.map_err(|e| {
            NestError::store(format!("Failed to write store file {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            NestError::store(format!(
                "Failed to replace store file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Number of documents in a collection
    pub async fn len(&self, collection: &str) -> usize {
        self.cache
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> NestResult<()> {
        {
            let mut cache = self.cache.write().await;
            cache
                .entry(collection.to_string())
                .or_default()
                .insert(key.to_string(), StoreEntry::new(key, value));
        }
        self.persist().await
    }

    async fn get(&self, collection: &str, key: &str) -> NestResult<Option<serde_json::Value>> {
        let cache = self.cache.read().await;
        Ok(cache
            .get(collection)
            .and_then(|c| c.get(key))
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, collection: &str, key: &str) -> NestResult<()> {
        let removed = {
            let mut cache = self.cache.write().await;
            cache
                .get_mut(collection)
                .and_then(|c| c.remove(key))
                .is_some()
        };
        if removed {
            self.persist().await?;
        }
        Ok(())
    }

    async fn list(&self, collection: &str, prefix: Option<&str>) -> NestResult<Vec<StoreEntry>> {
        let cache = self.cache.read().await;
        let Some(c) = cache.get(collection) else {
            return Ok(Vec::new());
        };
        let entries = match prefix {
            Some(p) => c
                .range(p.to_string()..)
                .take_while(|(k, _)| k.starts_with(p))
                .map(|(_, e)| e.clone())
                .collect(),
            None => c.values().cloned().collect(),
        };
        Ok(entries)
    }
}
