//! Store backend implementations

pub mod file;
pub mod memory;

use std::sync::Arc;

use nestguard_core::{NestResult, StorageConfig, Store};

/// Build the backend selected by configuration
pub async fn open_store(config: &StorageConfig) -> NestResult<Arc<dyn Store>> {
    match config {
        StorageConfig::Memory => {
            tracing::debug!("Using in-memory store");
            Ok(Arc::new(memory::InMemoryStore::new()))
        }
        StorageConfig::File { path } => {
            tracing::debug!("Using file store at {}", path);
            Ok(Arc::new(file::FileStore::new(path).await?))
        }
    }
}
