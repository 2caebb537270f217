//! Parental approval request types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::learning::LearningRecommendation;

/// Lifecycle state of an approval request. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    AutoApproved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Approved by a parent or by the auto-approval criteria
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved | Self::AutoApproved)
    }

    /// Compact encoding for atomic status cells
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Approved => 1,
            Self::AutoApproved => 2,
            Self::Rejected => 3,
            Self::Expired => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Approved),
            2 => Some(Self::AutoApproved),
            3 => Some(Self::Rejected),
            4 => Some(Self::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::AutoApproved => write!(f, "auto_approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// How quickly the parent should respond
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Normal,
    High,
}

impl Default for Urgency {
    fn default() -> Self {
        Self::Normal
    }
}

/// A request for a parent to approve a learning recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentalApprovalRequest {
    pub id: String,
    pub child_id: String,
    pub parent_id: String,
    pub created_at: DateTime<Utc>,
    pub recommendation: LearningRecommendation,
    /// Safety decision that routed this request, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub urgency: Urgency,
    pub expires_at: DateTime<Utc>,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approval_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,
}

impl ParentalApprovalRequest {
    pub fn new(
        child_id: impl Into<String>,
        parent_id: impl Into<String>,
        recommendation: LearningRecommendation,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            child_id: child_id.into(),
            parent_id: parent_id.into(),
            created_at,
            recommendation,
            decision_id: None,
            justification: String::new(),
            urgency: Urgency::Normal,
            expires_at: created_at + ttl,
            status: ApprovalStatus::Pending,
            parent_notes: None,
            auto_approval_reason: None,
            decided_at: None,
            approver_id: None,
        }
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_decision(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = Some(decision_id.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
