// Nestguard Core - Error types
//
// A single error enum shared by every crate in the workspace. Evaluation
// paths only ever surface `Configuration`; everything else degrades to a
// conservative result instead of propagating.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::approval::ApprovalStatus;

/// Result alias used across nestguard
pub type NestResult<T> = Result<T, NestError>;

/// Errors raised by the safety engine and approval workflow
#[derive(Debug, Error)]
pub enum NestError {
    /// Policy table is missing or malformed. Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed input or settings
    #[error("Validation error: {0}")]
    Validation(String),

    /// Approval request was already expired when submitted
    #[error("Approval request {request_id} expired at {expires_at}")]
    ExpiredRequest {
        request_id: String,
        expires_at: DateTime<Utc>,
    },

    /// Transition attempted on a request that already left `pending`
    #[error("Approval request {request_id} is {status}, not pending")]
    InvalidState {
        request_id: String,
        status: ApprovalStatus,
    },

    /// Approver has no authority over the child
    #[error("User {approver_id} is not authorized to decide for child {child_id}")]
    Authorization {
        approver_id: String,
        child_id: String,
    },

    /// Entity lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Notification delivery failure
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Profile provider or other collaborator failure
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NestError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Programmer-class errors that must never be absorbed by a fail-safe path
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
