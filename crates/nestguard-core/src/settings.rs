//! Parental control settings
//!
//! One settings document per (parent, child) pair. Every field has a serde
//! default so a partial document loads.
//!
//! Example:
//! ```yaml
//! parent_id: parent-1
//! child_id: kid-1
//! auto_approval:
//!   enabled: true
//!   criteria:
//!     max_duration_minutes: 20
//!     max_difficulty: beginner
//!     restricted_subjects: [history]
//! blocked_subjects: [chemistry]
//! notifications:
//!   channels: [push, email]
//!   quiet_hours:
//!     start: "21:00:00"
//!     end: "07:00:00"
//! ```

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NestError, NestResult};
use crate::learning::SkillLevel;
use crate::notification::ChannelKind;
use crate::safety::SafetyLevel;

/// Criteria a recommendation must meet to skip parental review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoApprovalCriteria {
    #[serde(default = "default_max_duration")]
    pub max_duration_minutes: u32,
    #[serde(default = "default_max_difficulty")]
    pub max_difficulty: SkillLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted_subjects: Vec<String>,
    /// Least safe level a parent is comfortable with. Stored for host
    /// applications; auto-approval does not re-evaluate safety.
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: SafetyLevel,
    /// Always ask before introducing content the child has not seen
    #[serde(default = "default_true")]
    pub require_review_for_new_content: bool,
}

fn default_max_duration() -> u32 {
    30
}

fn default_max_difficulty() -> SkillLevel {
    SkillLevel::Intermediate
}

fn default_safety_threshold() -> SafetyLevel {
    SafetyLevel::Safe
}

fn default_true() -> bool {
    true
}

impl Default for AutoApprovalCriteria {
    fn default() -> Self {
        Self {
            max_duration_minutes: default_max_duration(),
            max_difficulty: default_max_difficulty(),
            restricted_subjects: Vec::new(),
            safety_threshold: default_safety_threshold(),
            require_review_for_new_content: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoApprovalSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub criteria: AutoApprovalCriteria,
}

/// How aggressively content is filtered for this child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFilterLevel {
    Strict,
    Moderate,
    Relaxed,
}

impl Default for ContentFilterLevel {
    fn default() -> Self {
        Self::Strict
    }
}

/// Window during which non-urgent delivery is deferred
///
/// `start > end` wraps past midnight (e.g. 21:00 → 07:00). An empty window
/// (`start == end`) never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    /// Parent's offset from UTC, used to place quiet hours
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_true")]
    pub daily_digest: bool,
    #[serde(default)]
    pub weekly_digest: bool,
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Push]
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            quiet_hours: None,
            utc_offset_minutes: 0,
            daily_digest: true,
            weekly_digest: false,
        }
    }
}

impl NotificationPreferences {
    /// Whether either digest is enabled
    pub fn any_digest(&self) -> bool {
        self.daily_digest || self.weekly_digest
    }

    /// Whether `now` falls inside the parent's quiet hours
    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        let Some(window) = self.quiet_hours else {
            return false;
        };
        let local = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .map(|offset| now.with_timezone(&offset).time())
            .unwrap_or_else(|| now.time());
        window.contains(local)
    }
}

/// Controls a parent has configured for one child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentalControlSettings {
    pub parent_id: String,
    pub child_id: String,
    #[serde(default)]
    pub auto_approval: AutoApprovalSettings,
    /// When non-empty, only these subjects may be auto-approved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_subjects: Vec<String>,
    #[serde(default = "default_daily_limit")]
    pub daily_time_limit_minutes: u32,
    #[serde(default = "default_session_limit")]
    pub session_time_limit_minutes: u32,
    #[serde(default)]
    pub content_filter: ContentFilterLevel,
    #[serde(default)]
    pub notifications: NotificationPreferences,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_daily_limit() -> u32 {
    120
}

fn default_session_limit() -> u32 {
    30
}

impl ParentalControlSettings {
    /// Defaults applied on first access for a (parent, child) pair
    pub fn defaults_for(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
            auto_approval: AutoApprovalSettings::default(),
            allowed_subjects: Vec::new(),
            blocked_subjects: Vec::new(),
            daily_time_limit_minutes: default_daily_limit(),
            session_time_limit_minutes: default_session_limit(),
            content_filter: ContentFilterLevel::default(),
            notifications: NotificationPreferences::default(),
            updated_at: Utc::now(),
        }
    }

    /// Storage key for this settings document
    pub fn key(&self) -> String {
        settings_key(&self.parent_id, &self.child_id)
    }

    /// Subject is excluded from auto-approval by criteria, deny list or allow list
    pub fn is_subject_restricted(&self, subject: &str) -> bool {
        let matches = |list: &[String]| list.iter().any(|s| s.eq_ignore_ascii_case(subject));

        if matches(&self.auto_approval.criteria.restricted_subjects)
            || matches(&self.blocked_subjects)
        {
            return true;
        }
        !self.allowed_subjects.is_empty() && !matches(&self.allowed_subjects)
    }

    pub fn validate(&self) -> NestResult<()> {
        if self.parent_id.is_empty() || self.child_id.is_empty() {
            return Err(NestError::validation("parent_id and child_id are required"));
        }
        if self.session_time_limit_minutes > self.daily_time_limit_minutes {
            return Err(NestError::validation(format!(
                "session limit {} exceeds daily limit {}",
                self.session_time_limit_minutes, self.daily_time_limit_minutes
            )));
        }
        if self.notifications.utc_offset_minutes.abs() > 14 * 60 {
            return Err(NestError::validation(format!(
                "utc_offset_minutes {} out of range",
                self.notifications.utc_offset_minutes
            )));
        }
        Ok(())
    }
}

/// Storage key for a (parent, child) pair
pub fn settings_key(parent_id: &str, child_id: &str) -> String {
    format!("{}:{}", parent_id, child_id)
}
