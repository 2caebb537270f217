//! Learning content and adaptation inputs
//!
//! These are produced upstream (content catalogs, the adaptation engine) and
//! are read-only here. Missing fields deserialize to conservative defaults so
//! a malformed input still yields an auditable rejection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::safety::{AgeGroup, RiskLevel, SafetyLevel};

/// Kind of learning content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Educational,
    Story,
    Music,
    Game,
    Conversation,
    BehavioralPattern,
    Routine,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Educational,
        ContentType::Story,
        ContentType::Music,
        ContentType::Game,
        ContentType::Conversation,
        ContentType::BehavioralPattern,
        ContentType::Routine,
    ];
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Educational => write!(f, "educational"),
            Self::Story => write!(f, "story"),
            Self::Music => write!(f, "music"),
            Self::Game => write!(f, "game"),
            Self::Conversation => write!(f, "conversation"),
            Self::BehavioralPattern => write!(f, "behavioral_pattern"),
            Self::Routine => write!(f, "routine"),
        }
    }
}

/// Kind of behavioral adaptation the assistant proposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationType {
    ResponseStyle,
    ContentDifficulty,
    LearningPace,
    InteractionPattern,
    PersonalityAdjustment,
    TopicPreference,
}

impl AdaptationType {
    pub const ALL: [AdaptationType; 6] = [
        AdaptationType::ResponseStyle,
        AdaptationType::ContentDifficulty,
        AdaptationType::LearningPace,
        AdaptationType::InteractionPattern,
        AdaptationType::PersonalityAdjustment,
        AdaptationType::TopicPreference,
    ];
}

impl std::fmt::Display for AdaptationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResponseStyle => write!(f, "response_style"),
            Self::ContentDifficulty => write!(f, "content_difficulty"),
            Self::LearningPace => write!(f, "learning_pace"),
            Self::InteractionPattern => write!(f, "interaction_pattern"),
            Self::PersonalityAdjustment => write!(f, "personality_adjustment"),
            Self::TopicPreference => write!(f, "topic_preference"),
        }
    }
}

/// How closely an adult supervises the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionLevel {
    None,
    Light,
    Moderate,
    Full,
}

impl Default for SupervisionLevel {
    fn default() -> Self {
        Self::None
    }
}

/// Context the content will be consumed in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_age: Option<u32>,
    #[serde(default)]
    pub supervision_level: SupervisionLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_rating: Option<String>,
}

fn undeclared_safety_level() -> SafetyLevel {
    SafetyLevel::Blocked
}

/// A piece of learning content submitted for validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningContent {
    pub id: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub source: String,
    /// Free text to scan, when the content has any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub context: ContentContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_age_group: Option<AgeGroup>,
    /// Safety level declared by the producer; undeclared counts as blocked
    #[serde(default = "undeclared_safety_level")]
    pub safety_level: SafetyLevel,
}

impl LearningContent {
    pub fn new(
        id: impl Into<String>,
        content_type: ContentType,
        safety_level: SafetyLevel,
    ) -> Self {
        Self {
            id: id.into(),
            content_type,
            source: String::new(),
            text: None,
            context: ContentContext::default(),
            target_age_group: None,
            safety_level,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_context(mut self, context: ContentContext) -> Self {
        self.context = context;
        self
    }
}

/// Magnitude of the behavior change an adaptation causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactMagnitude {
    Minor,
    Moderate,
    Major,
}

impl Default for ImpactMagnitude {
    fn default() -> Self {
        Self::Major
    }
}

/// Where and how strongly an adaptation changes the assistant's behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptationImpact {
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub behavior_change: ImpactMagnitude,
}

impl AdaptationImpact {
    pub fn new(area: impl Into<String>, behavior_change: ImpactMagnitude) -> Self {
        Self {
            area: area.into(),
            behavior_change,
        }
    }

    pub fn is_major_behavior_change(&self) -> bool {
        self.behavior_change == ImpactMagnitude::Major
    }
}

/// Upstream risk assessment attached to an adaptation
///
/// Ratings missing from an input document count as high.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(default = "unassessed_risk")]
    pub overall: RiskLevel,
    #[serde(default = "unassessed_risk")]
    pub privacy: RiskLevel,
    #[serde(default = "unassessed_risk")]
    pub safety: RiskLevel,
    #[serde(default = "unassessed_risk")]
    pub developmental: RiskLevel,
}

fn unassessed_risk() -> RiskLevel {
    RiskLevel::High
}

impl RiskAssessment {
    /// Stand-in for an input that carried no assessment
    pub fn unassessed() -> Self {
        Self::uniform(unassessed_risk())
    }

    pub fn uniform(level: RiskLevel) -> Self {
        Self {
            overall: level,
            privacy: level,
            safety: level,
            developmental: level,
        }
    }
}

/// A proposed change to how the assistant behaves for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningAdaptation {
    pub id: String,
    pub user_id: String,
    pub adaptation_type: AdaptationType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub impact: AdaptationImpact,
    /// Confidence in [0, 1]; missing means no confidence at all
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub proposed_changes: HashMap<String, serde_json::Value>,
    #[serde(default = "RiskAssessment::unassessed")]
    pub risk_assessment: RiskAssessment,
}

impl LearningAdaptation {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        adaptation_type: AdaptationType,
        confidence: f64,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            adaptation_type,
            description: String::new(),
            impact: AdaptationImpact::new("interaction", ImpactMagnitude::Minor),
            confidence,
            proposed_changes: HashMap::new(),
            risk_assessment: RiskAssessment::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_impact(mut self, impact: AdaptationImpact) -> Self {
        self.impact = impact;
        self
    }

    pub fn with_risk(mut self, risk_assessment: RiskAssessment) -> Self {
        self.risk_assessment = risk_assessment;
        self
    }

    pub fn with_change(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.proposed_changes.insert(key.into(), value);
        self
    }

    /// Confidence clamped into [0, 1]; NaN counts as zero
    pub fn effective_confidence(&self) -> f64 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}

/// Difficulty of a recommended learning activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

/// Learning activity plus the adaptation to apply once a parent approves it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecommendation {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub skill_level: SkillLevel,
    pub estimated_duration_minutes: u32,
    /// Content the child has not seen before
    #[serde(default)]
    pub is_new_content: bool,
    pub adaptation: LearningAdaptation,
}
