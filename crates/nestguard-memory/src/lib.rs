//! Nestguard Memory - Store backends for settings, approvals and audit entries
//!
//! ## Backends
//!
//! - **InMemoryStore**: Lock-free DashMap storage, cleared on restart (default)
//! - **FileStore**: JSON file storage that survives restarts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nestguard_core::StorageConfig;
//! use nestguard_memory::open_store;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = open_store(&StorageConfig::File { path: "./nestguard.json".into() }).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;

pub use backend::file::FileStore;
pub use backend::memory::InMemoryStore;
pub use backend::open_store;

pub use nestguard_core::{Store, StoreEntry};
