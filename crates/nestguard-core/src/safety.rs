//! Safety classification types
//!
//! Ordinal values (safety level, violation severity, risk level) are plain
//! enums with a derived total order, declared from least to most severe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse age bracket driving which safety rule applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    Toddler,
    Child,
    Teen,
    Adult,
    Senior,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 5] = [
        AgeGroup::Toddler,
        AgeGroup::Child,
        AgeGroup::Teen,
        AgeGroup::Adult,
        AgeGroup::Senior,
    ];

    /// Bracket for an age in years
    pub fn from_age(years: u32) -> Self {
        match years {
            0..=4 => Self::Toddler,
            5..=12 => Self::Child,
            13..=17 => Self::Teen,
            18..=64 => Self::Adult,
            _ => Self::Senior,
        }
    }

    /// Adults and seniors are never routed to parental approval
    pub fn is_self_governing(&self) -> bool {
        matches!(self, Self::Adult | Self::Senior)
    }
}

impl std::fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Toddler => write!(f, "toddler"),
            Self::Child => write!(f, "child"),
            Self::Teen => write!(f, "teen"),
            Self::Adult => write!(f, "adult"),
            Self::Senior => write!(f, "senior"),
        }
    }
}

impl std::str::FromStr for AgeGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "toddler" => Ok(Self::Toddler),
            "child" => Ok(Self::Child),
            "teen" => Ok(Self::Teen),
            "adult" => Ok(Self::Adult),
            "senior" => Ok(Self::Senior),
            _ => Err(format!("Unknown age group: {}", s)),
        }
    }
}

/// Safety classification, safest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Warning,
    Blocked,
}

impl SafetyLevel {
    /// True when `self` is at least as safe as `minimum`
    pub fn meets(&self, minimum: SafetyLevel) -> bool {
        *self <= minimum
    }

    /// Resulting level for a set of violations
    pub fn from_violations(violations: &[SafetyViolation]) -> Self {
        match violations.iter().map(|v| v.severity).max() {
            None => Self::Safe,
            Some(ViolationSeverity::Critical) => Self::Blocked,
            Some(ViolationSeverity::High) => Self::Warning,
            Some(ViolationSeverity::Medium) | Some(ViolationSeverity::Low) => Self::Caution,
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Caution => write!(f, "caution"),
            Self::Warning => write!(f, "warning"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Severity of a detected violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Risk rating used by risk assessments and adaptation scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a count of risk factors onto a level
    pub fn from_factor_count(factors: usize) -> Self {
        match factors {
            0 => Self::Low,
            1 => Self::Medium,
            2 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    pub fn as_severity(&self) -> ViolationSeverity {
        match self {
            Self::Low => ViolationSeverity::Low,
            Self::Medium => ViolationSeverity::Medium,
            Self::High => ViolationSeverity::High,
            Self::Critical => ViolationSeverity::Critical,
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Category of a safety violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    AgeInappropriate,
    InappropriateContent,
    PrivacyViolation,
    BehavioralConcern,
    /// The evaluation itself could not complete
    EvaluationFailure,
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AgeInappropriate => write!(f, "age_inappropriate"),
            Self::InappropriateContent => write!(f, "inappropriate_content"),
            Self::PrivacyViolation => write!(f, "privacy_violation"),
            Self::BehavioralConcern => write!(f, "behavioral_concern"),
            Self::EvaluationFailure => write!(f, "evaluation_failure"),
        }
    }
}

/// A detected policy violation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyViolation {
    pub id: String,
    pub violation_type: ViolationType,
    pub severity: ViolationSeverity,
    pub description: String,
    /// Excerpt of the offending content, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_content: Option<String>,
    pub age_group: AgeGroup,
    pub recommended_action: String,
    pub timestamp: DateTime<Utc>,
}

impl SafetyViolation {
    pub fn new(
        violation_type: ViolationType,
        severity: ViolationSeverity,
        description: impl Into<String>,
        age_group: AgeGroup,
        recommended_action: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            violation_type,
            severity,
            description: description.into(),
            detected_content: None,
            age_group,
            recommended_action: recommended_action.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the offending excerpt
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.detected_content = Some(excerpt.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == ViolationSeverity::Critical
    }
}

/// Outcome recorded by an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Approved,
    Rejected,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    ApprovalExpired,
}

/// One line of the evaluation audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor: String,
    pub details: String,
}

impl AuditEntry {
    pub fn new(action: AuditAction, actor: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            actor: actor.into(),
            details: details.into(),
        }
    }
}

/// Result of validating one piece of content or one adaptation
///
/// Built fresh per evaluation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyValidationResult {
    pub approved: bool,
    pub safety_level: SafetyLevel,
    pub violations: Vec<SafetyViolation>,
    pub recommendations: Vec<String>,
    pub requires_parental_approval: bool,
    pub audit_entries: Vec<AuditEntry>,
}

impl SafetyValidationResult {
    /// Aggregate violations into a result; `approved` iff no violations
    pub fn from_violations(
        violations: Vec<SafetyViolation>,
        recommendations: Vec<String>,
        requires_parental_approval: bool,
        audit_entry: AuditEntry,
    ) -> Self {
        Self {
            approved: violations.is_empty(),
            safety_level: SafetyLevel::from_violations(&violations),
            violations,
            recommendations,
            requires_parental_approval,
            audit_entries: vec![audit_entry],
        }
    }

    pub fn has_critical_violation(&self) -> bool {
        self.violations.iter().any(SafetyViolation::is_critical)
    }
}

/// What kind of evaluation produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    ContentValidation,
    AdaptationValidation,
}

/// A recorded safety decision, the unit of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyDecision {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub decision_type: DecisionType,
    /// Id of the evaluated content or adaptation
    pub subject_id: String,
    pub result: SafetyValidationResult,
    pub requires_approval: bool,
    #[serde(default)]
    pub approval_received: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,
}

impl SafetyDecision {
    pub fn new(
        user_id: impl Into<String>,
        decision_type: DecisionType,
        subject_id: impl Into<String>,
        result: SafetyValidationResult,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let requires_approval = result.requires_parental_approval;
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            timestamp,
            decision_type,
            subject_id: subject_id.into(),
            result,
            requires_approval,
            approval_received: false,
            approval_timestamp: None,
            approver_id: None,
        }
    }

    /// Record the parental approval. Returns false if one was already recorded.
    pub fn record_approval(&mut self, approver_id: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.approval_received {
            return false;
        }
        self.approval_received = true;
        self.approval_timestamp = Some(at);
        self.approver_id = Some(approver_id.into());
        true
    }
}
