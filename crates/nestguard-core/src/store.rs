//! Persistent store abstraction
//!
//! Settings, approval requests and audit entries are JSON documents in named
//! collections. Backends live in `nestguard-memory`; encryption at rest is the
//! backend's concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::NestResult;

/// Well-known collection names
pub mod collections {
    pub const SETTINGS: &str = "settings";
    pub const APPROVAL_REQUESTS: &str = "approval_requests";
    pub const AUDIT: &str = "audit";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl StoreEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            updated_at: Utc::now(),
        }
    }
}

/// Durable key/document storage
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace a document
    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> NestResult<()>;

    /// Fetch a document
    async fn get(&self, collection: &str, key: &str) -> NestResult<Option<serde_json::Value>>;

    /// Remove a document; absent keys are not an error
    async fn delete(&self, collection: &str, key: &str) -> NestResult<()>;

    /// Range-list a collection in key order, optionally restricted to a prefix
    async fn list(&self, collection: &str, prefix: Option<&str>) -> NestResult<Vec<StoreEntry>>;
}

/// Serialize and store a typed document
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn Store,
    collection: &str,
    key: &str,
    value: &T,
) -> NestResult<()> {
    let value = serde_json::to_value(value)?;
    store.put(collection, key, value).await
}

/// Fetch and deserialize a typed document
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn Store,
    collection: &str,
    key: &str,
) -> NestResult<Option<T>> {
    match store.get(collection, key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Range-list and deserialize a collection, skipping documents that no longer parse
pub async fn list_json<T: DeserializeOwned>(
    store: &dyn Store,
    collection: &str,
    prefix: Option<&str>,
) -> NestResult<Vec<T>> {
    let entries = store.list(collection, prefix).await?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value(entry.value) {
            Ok(value) => out.push(value),
            Err(e) => tracing::warn!(
                "Skipping unreadable {} document {}: {}",
                collection,
                entry.key,
                e
            ),
        }
    }
    Ok(out)
}
