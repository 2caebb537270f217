//! Repositories over the persistent store
//!
//! Each repository owns one collection and exposes typed operations on it.
//! They are cheap to clone and share the same `Arc<dyn Store>`.

mod approvals;
mod settings;

pub use approvals::ApprovalRepository;
pub use settings::SettingsRepository;
