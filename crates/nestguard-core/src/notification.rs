//! Parental notifications and delivery channels

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NestResult;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApprovalRequired,
    ApprovalDecision,
    AutoApproved,
    RequestExpired,
    SafetyAlert,
    DailySummary,
    WeeklySummary,
}

/// Delivery priority, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl NotificationPriority {
    /// Priorities that are dispatched immediately outside quiet hours
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::High | Self::Urgent)
    }
}

/// Delivery surface for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Spoken through the assistant device
    Voice,
    /// Shown on the device avatar / screen
    Visual,
    Email,
    /// In-app push
    Push,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voice => write!(f, "voice"),
            Self::Visual => write!(f, "visual"),
            Self::Email => write!(f, "email"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// A message for a parent about one of their children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentalNotification {
    pub id: String,
    pub parent_id: String,
    pub child_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub action_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ParentalNotification {
    pub fn new(
        parent_id: impl Into<String>,
        child_id: impl Into<String>,
        notification_type: NotificationType,
        priority: NotificationPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: parent_id.into(),
            child_id: child_id.into(),
            notification_type,
            title: title.into(),
            message: message.into(),
            priority,
            created_at: Utc::now(),
            read: false,
            action_required: false,
            request_id: None,
        }
    }

    pub fn action_required(mut self) -> Self {
        self.action_required = true;
        self
    }

    pub fn for_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Delivery channel abstraction
///
/// Implement this trait to deliver notifications to a device surface (voice,
/// avatar, email, push). Rendering is the channel's concern.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which surface this channel delivers to
    fn kind(&self) -> ChannelKind;

    /// Deliver one notification
    async fn deliver(&self, notification: &ParentalNotification) -> NestResult<()>;
}
