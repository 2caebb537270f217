//! Nestguard Runtime - Approval workflow, audit trail and parent notifications
//!
//! This crate provides:
//! - Repositories for parental settings and approval requests over a `Store`
//! - The append-only audit log and compliance reports
//! - The notification scheduler (immediate dispatch, quiet hours, digests)
//! - The approval workflow with race-free decide/expire transitions
//! - `Guardian`, which wires all of the above behind one facade

pub mod audit;
pub mod guardian;
pub mod notify;
pub mod repository;
pub mod workflow;

pub use audit::{AuditLog, AuditReport, CriticalAlertSink};
pub use guardian::{Guardian, SafetyReview};
pub use notify::{DigestPeriod, Dispatch, NotificationInbox, NotificationScheduler, TracingChannel};
pub use repository::{ApprovalRepository, SettingsRepository};
pub use workflow::{can_auto_approve, ApprovalWorkflow};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
