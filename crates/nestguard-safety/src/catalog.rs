//! Rule Catalog - Age-tiered safety rules
//!
//! Each age group has exactly one rule:
//! - toddler: Narrowest content set, highest confidence bar
//! - child: Adds games and conversation, supervised
//! - teen: Adds behavioral and routine content, unsupervised
//! - adult/senior: Everything allowed, never routed to parental approval
//!
//! The catalog is built once and shared read-only afterwards.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use nestguard_core::{AdaptationType, AgeGroup, ContentType, NestError, NestResult, SafetyLevel};
use serde::{Deserialize, Serialize};

/// Kind expected in a rule catalog resource
pub const RULE_CATALOG_KIND: &str = "SafetyRuleCatalog";

/// Policy for one age group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRule {
    /// Age group this rule governs
    pub age_group: AgeGroup,

    /// Content types that may be presented
    #[serde(default)]
    pub allowed_content_types: HashSet<ContentType>,

    /// Adaptation types that may be applied
    #[serde(default)]
    pub allowed_adaptation_types: HashSet<AdaptationType>,

    /// Declared content safety must be at least this safe
    #[serde(default = "default_min_safety_level")]
    pub min_safety_level: SafetyLevel,

    /// Adaptations below this confidence need review
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Cap on adaptations applied per day
    #[serde(default)]
    pub max_daily_adaptations: u32,

    /// Whether an adult must supervise sessions
    #[serde(default = "default_requires_supervision")]
    pub requires_supervision: bool,
}

fn default_min_safety_level() -> SafetyLevel {
    SafetyLevel::Safe
}

fn default_min_confidence() -> f64 {
    1.0
}

fn default_requires_supervision() -> bool {
    true
}

impl SafetyRule {
    /// Rule for ages 0-4
    pub fn toddler() -> Self {
        Self {
            age_group: AgeGroup::Toddler,
            allowed_content_types: [
                ContentType::Educational,
                ContentType::Story,
                ContentType::Music,
            ]
            .into_iter()
            .collect(),
            allowed_adaptation_types: [
                AdaptationType::ResponseStyle,
                AdaptationType::ContentDifficulty,
            ]
            .into_iter()
            .collect(),
            min_safety_level: SafetyLevel::Safe,
            min_confidence: 0.95,
            max_daily_adaptations: 3,
            requires_supervision: true,
        }
    }

    /// Rule for ages 5-12
    pub fn child() -> Self {
        Self {
            age_group: AgeGroup::Child,
            allowed_content_types: [
                ContentType::Educational,
                ContentType::Story,
                ContentType::Music,
                ContentType::Game,
                ContentType::Conversation,
            ]
            .into_iter()
            .collect(),
            allowed_adaptation_types: [
                AdaptationType::ResponseStyle,
                AdaptationType::ContentDifficulty,
                AdaptationType::LearningPace,
                AdaptationType::InteractionPattern,
                AdaptationType::PersonalityAdjustment,
            ]
            .into_iter()
            .collect(),
            min_safety_level: SafetyLevel::Safe,
            min_confidence: 0.85,
            max_daily_adaptations: 5,
            requires_supervision: true,
        }
    }

    /// Rule for ages 13-17
    pub fn teen() -> Self {
        let child = Self::child();
        let mut content = child.allowed_content_types;
        content.extend([ContentType::BehavioralPattern, ContentType::Routine]);
        let mut adaptations = child.allowed_adaptation_types;
        adaptations.insert(AdaptationType::TopicPreference);

        Self {
            age_group: AgeGroup::Teen,
            allowed_content_types: content,
            allowed_adaptation_types: adaptations,
            min_safety_level: SafetyLevel::Caution,
            min_confidence: 0.75,
            max_daily_adaptations: 10,
            requires_supervision: false,
        }
    }

    /// Rule for ages 18-64
    pub fn adult() -> Self {
        Self::unrestricted(AgeGroup::Adult, SafetyLevel::Warning, 0.60, 20)
    }

    /// Rule for ages 65 and up
    pub fn senior() -> Self {
        Self::unrestricted(AgeGroup::Senior, SafetyLevel::Caution, 0.70, 15)
    }

    fn unrestricted(
        age_group: AgeGroup,
        min_safety_level: SafetyLevel,
        min_confidence: f64,
        max_daily_adaptations: u32,
    ) -> Self {
        Self {
            age_group,
            allowed_content_types: ContentType::ALL.into_iter().collect(),
            allowed_adaptation_types: AdaptationType::ALL.into_iter().collect(),
            min_safety_level,
            min_confidence,
            max_daily_adaptations,
            requires_supervision: false,
        }
    }

    /// Built-in rule for an age group
    pub fn builtin(age_group: AgeGroup) -> Self {
        match age_group {
            AgeGroup::Toddler => Self::toddler(),
            AgeGroup::Child => Self::child(),
            AgeGroup::Teen => Self::teen(),
            AgeGroup::Adult => Self::adult(),
            AgeGroup::Senior => Self::senior(),
        }
    }

    pub fn allows_content(&self, content_type: ContentType) -> bool {
        self.allowed_content_types.contains(&content_type)
    }

    pub fn allows_adaptation(&self, adaptation_type: AdaptationType) -> bool {
        self.allowed_adaptation_types.contains(&adaptation_type)
    }

    /// True when `confidence` clears this tier's threshold
    pub fn confidence_meets(&self, confidence: f64) -> bool {
        confidence >= self.min_confidence
    }

    /// True while another adaptation may still be applied today
    pub fn within_daily_limit(&self, applied_today: u32) -> bool {
        applied_today < self.max_daily_adaptations
    }

    fn validate(&self) -> NestResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(NestError::configuration(format!(
                "Rule for {} has min_confidence {} outside [0, 1]",
                self.age_group, self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Rule catalog resource as loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCatalogConfig {
    /// API version
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: CatalogMetadata,
    /// Spec containing the rules
    pub spec: CatalogSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSpec {
    #[serde(default)]
    pub rules: Vec<SafetyRule>,
}

/// Immutable lookup table from age group to rule
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: HashMap<AgeGroup, SafetyRule>,
    name: String,
}

impl RuleCatalog {
    /// Catalog with the built-in rules
    pub fn new() -> Self {
        Self {
            rules: AgeGroup::ALL
                .into_iter()
                .map(|group| (group, SafetyRule::builtin(group)))
                .collect(),
            name: "builtin".to_string(),
        }
    }

    /// Build a catalog from explicit rules
    ///
    /// Every age group must be covered exactly once.
    pub fn from_rules(name: impl Into<String>, rules: Vec<SafetyRule>) -> NestResult<Self> {
        let mut by_group = HashMap::new();
        for rule in rules {
            rule.validate()?;
            let group = rule.age_group;
            if by_group.insert(group, rule).is_some() {
                return Err(NestError::configuration(format!(
                    "Duplicate safety rule for age group {}",
                    group
                )));
            }
        }

        let missing: Vec<String> = AgeGroup::ALL
            .iter()
            .filter(|g| !by_group.contains_key(*g))
            .map(|g| g.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(NestError::configuration(format!(
                "Safety rule catalog is missing age groups: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            rules: by_group,
            name: name.into(),
        })
    }

    /// Load from a RuleCatalogConfig
    pub fn from_config(config: RuleCatalogConfig) -> NestResult<Self> {
        if config.kind != RULE_CATALOG_KIND {
            return Err(NestError::configuration(format!(
                "Expected kind {}, found {}",
                RULE_CATALOG_KIND, config.kind
            )));
        }
        Self::from_rules(config.metadata.name, config.spec.rules)
    }

    /// Load from a YAML string
    pub fn from_yaml_str(content: &str) -> NestResult<Self> {
        let config: RuleCatalogConfig = serde_yaml::from_str(content).map_err(|e| {
            NestError::configuration(format!("Failed to parse rule catalog: {}", e))
        })?;
        Self::from_config(config)
    }

    /// Load from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> NestResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NestError::configuration(format!(
                "Failed to read rule catalog {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Rule for an age group
    pub fn lookup(&self, age_group: AgeGroup) -> NestResult<&SafetyRule> {
        self.rules.get(&age_group).ok_or_else(|| {
            NestError::configuration(format!("No safety rule for age group {}", age_group))
        })
    }

    /// Catalog name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rules ordered from youngest to oldest group
    pub fn rules(&self) -> impl Iterator<Item = &SafetyRule> {
        AgeGroup::ALL
            .into_iter()
            .filter_map(move |g| self.rules.get(&g))
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_YAML: &str = r#"
apiVersion: nestguard.dev/v1
kind: SafetyRuleCatalog
metadata:
  name: strict-household
spec:
  rules:
    - age_group: toddler
      allowed_content_types: [educational]
      allowed_adaptation_types: [response_style]
      min_safety_level: safe
      min_confidence: 0.99
      max_daily_adaptations: 1
    - age_group: child
      allowed_content_types: [educational, story]
      min_confidence: 0.9
      max_daily_adaptations: 2
    - age_group: teen
      allowed_content_types: [educational, story, game]
      min_safety_level: caution
      min_confidence: 0.8
      max_daily_adaptations: 5
      requires_supervision: false
    - age_group: adult
      allowed_content_types: [educational]
      min_safety_level: warning
      min_confidence: 0.6
      max_daily_adaptations: 20
      requires_supervision: false
    - age_group: senior
      min_safety_level: caution
      min_confidence: 0.7
      max_daily_adaptations: 15
      requires_supervision: false
"#;

    #[test]
    fn test_builtin_tiers() {
        let catalog = RuleCatalog::new();

        let toddler = catalog.lookup(AgeGroup::Toddler).unwrap();
        assert!(toddler.allows_content(ContentType::Story));
        assert!(!toddler.allows_content(ContentType::Game));
        assert!(!toddler.allows_adaptation(AdaptationType::LearningPace));
        assert_eq!(toddler.min_confidence, 0.95);
        assert!(toddler.requires_supervision);

        let child = catalog.lookup(AgeGroup::Child).unwrap();
        assert!(child.allows_content(ContentType::Conversation));
        assert!(!child.allows_content(ContentType::Routine));
        assert!(child.allows_adaptation(AdaptationType::PersonalityAdjustment));
        assert!(!child.allows_adaptation(AdaptationType::TopicPreference));

        let teen = catalog.lookup(AgeGroup::Teen).unwrap();
        assert!(teen.allows_content(ContentType::BehavioralPattern));
        assert!(teen.allows_adaptation(AdaptationType::TopicPreference));
        assert_eq!(teen.min_safety_level, SafetyLevel::Caution);
        assert!(!teen.requires_supervision);

        let adult = catalog.lookup(AgeGroup::Adult).unwrap();
        assert_eq!(adult.allowed_content_types.len(), ContentType::ALL.len());
        assert_eq!(adult.min_safety_level, SafetyLevel::Warning);

        let senior = catalog.lookup(AgeGroup::Senior).unwrap();
        assert_eq!(senior.max_daily_adaptations, 15);
    }

    #[test]
    fn test_confidence_and_daily_limit() {
        let rule = SafetyRule::toddler();
        assert!(rule.confidence_meets(0.95));
        assert!(!rule.confidence_meets(0.9));
        assert!(rule.within_daily_limit(2));
        assert!(!rule.within_daily_limit(3));
    }

    #[test]
    fn test_load_from_yaml() {
        let catalog = RuleCatalog::from_yaml_str(CATALOG_YAML).unwrap();
        assert_eq!(catalog.name(), "strict-household");

        let child = catalog.lookup(AgeGroup::Child).unwrap();
        assert!(!child.allows_content(ContentType::Game));
        assert!(child.requires_supervision);
        assert_eq!(child.max_daily_adaptations, 2);

        let senior = catalog.lookup(AgeGroup::Senior).unwrap();
        assert!(senior.allowed_content_types.is_empty());

        let groups: Vec<_> = catalog.rules().map(|r| r.age_group).collect();
        assert_eq!(groups, AgeGroup::ALL.to_vec());
    }

    #[test]
    fn test_incomplete_catalog_rejected() {
        let rules = vec![SafetyRule::toddler(), SafetyRule::child()];
        let err = RuleCatalog::from_rules("partial", rules).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("teen"));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut rules: Vec<_> = AgeGroup::ALL.into_iter().map(SafetyRule::builtin).collect();
        rules.push(SafetyRule::teen());
        assert!(RuleCatalog::from_rules("dup", rules).is_err());
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let mut rules: Vec<_> = AgeGroup::ALL.into_iter().map(SafetyRule::builtin).collect();
        rules[0].min_confidence = 1.5;
        assert!(RuleCatalog::from_rules("bad", rules).is_err());
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let yaml = CATALOG_YAML.replace("SafetyRuleCatalog", "NestguardConfig");
        assert!(RuleCatalog::from_yaml_str(&yaml).is_err());
    }
}
