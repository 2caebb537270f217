//! In-memory store backend
//!
//! One DashMap shard per collection, each holding a key-ordered map so range
//! listing comes out sorted without a separate sort pass.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use nestguard_core::{NestResult, Store, StoreEntry};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: DashMap<String, BTreeMap<String, StoreEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> NestResult<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), StoreEntry::new(key, value));
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> NestResult<Option<serde_json::Value>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(key).map(|e| e.value.clone())))
    }

    async fn delete(&self, collection: &str, key: &str) -> NestResult<()> {
        if let Some(mut c) = self.collections.get_mut(collection) {
            c.remove(key);
        }
        Ok(())
    }

    async fn list(&self, collection: &str, prefix: Option<&str>) -> NestResult<Vec<StoreEntry>> {
        let Some(c) = self.collections.get(collection) else {
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
