//! Evaluator Integration Tests
//!
//! Exercises the evaluator end to end with a static profile table:
//! - Age-tier rules for content and adaptations
//! - Text scanning mapped onto violations
//! - Fail-safe handling of unknown users and provider failures
//! - Adult and senior users never needing parental approval

use std::sync::Arc;

use async_trait::async_trait;
use nestguard_core::{
    AdaptationImpact, AdaptationType, AgeGroup, AuditAction, ContentType, ImpactMagnitude,
    LearningAdaptation, LearningContent, NestError, NestResult, RiskAssessment, RiskLevel,
    SafetyLevel, StaticProfileProvider, UserProfile, UserProfileProvider, ViolationSeverity,
    ViolationType,
};
use nestguard_safety::{ContentPatternScanner, RuleCatalog, SafetyEvaluator};

/// Profile provider whose backend is always down
struct UnavailableProfiles;

#[async_trait]
impl UserProfileProvider for UnavailableProfiles {
    async fn get_profile(&self, _user_id: &str) -> NestResult<Option<UserProfile>> {
        Err(NestError::collaborator("profile service unavailable"))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn evaluator() -> SafetyEvaluator {
    let profiles = StaticProfileProvider::new()
        .with_profile(UserProfile::new("toddler-1", AgeGroup::Toddler))
        .with_profile(UserProfile::new("child-1", AgeGroup::Child))
        .with_profile(UserProfile::new("teen-1", AgeGroup::Teen))
        .with_profile(UserProfile::new("adult-1", AgeGroup::Adult))
        .with_profile(UserProfile::new("senior-1", AgeGroup::Senior));
    SafetyEvaluator::new(Arc::new(profiles))
}

// ============================================================================
// Content Validation Tests
// ============================================================================

#[tokio::test]
async fn test_toddler_behavioral_pattern_content_rejected() {
    init_tracing();
    let content = LearningContent::new("c-1", ContentType::BehavioralPattern, SafetyLevel::Safe);

    let result = evaluator()
        .validate_learning_content(&content, "toddler-1")
        .await
        .unwrap();

    assert!(!result.approved);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].violation_type, ViolationType::AgeInappropriate);
    assert_eq!(result.violations[0].severity, ViolationSeverity::High);
    assert_eq!(result.violations[0].age_group, AgeGroup::Toddler);
    assert!(result.requires_parental_approval);
    assert_eq!(result.safety_level, SafetyLevel::Warning);
    assert_eq!(result.audit_entries.len(), 1);
    assert_eq!(result.audit_entries[0].action, AuditAction::Rejected);
}

#[tokio::test]
async fn test_clean_story_approved_for_child() {
    let content = LearningContent::new("c-2", ContentType::Story, SafetyLevel::Safe)
        .with_text("Once upon a time a small turtle learned to swim.");

    let result = evaluator()
        .validate_learning_content(&content, "child-1")
        .await
        .unwrap();

    assert!(result.approved);
    assert!(result.violations.is_empty());
    assert!(!result.requires_parental_approval);
    assert_eq!(result.safety_level, SafetyLevel::Safe);
    assert_eq!(result.audit_entries[0].action, AuditAction::Approved);
}

#[tokio::test]
async fn test_text_issues_become_violations() {
    let content = LearningContent::new("c-3", ContentType::Conversation, SafetyLevel::Safe)
        .with_text("That was damn stupid! Let's talk about gambling.");

    let result = evaluator()
        .validate_learning_content(&content, "child-1")
        .await
        .unwrap();

    assert!(!result.approved);
    let language: Vec<_> = result
        .violations
        .iter()
        .filter(|v| v.violation_type == ViolationType::InappropriateContent)
        .collect();
    assert_eq!(language.len(), 2);
    assert!(language.iter().all(|v| v.severity == ViolationSeverity::High));

    let adult = result
        .violations
        .iter()
        .find(|v| v.violation_type == ViolationType::AgeInappropriate)
        .unwrap();
    assert_eq!(adult.severity, ViolationSeverity::Critical);
    assert_eq!(adult.detected_content.as_deref(), Some("gambling"));

    assert_eq!(result.safety_level, SafetyLevel::Blocked);
    assert!(result.has_critical_violation());
    assert!(!result.recommendations.is_empty());
}

#[tokio::test]
async fn test_declared_safety_level_below_minimum() {
    let content = LearningContent::new("c-4", ContentType::Game, SafetyLevel::Warning);

    let teen = evaluator()
        .validate_learning_content(&content, "teen-1")
        .await
        .unwrap();
    assert!(!teen.approved);
    assert_eq!(teen.violations.len(), 1);
    assert_eq!(teen.violations[0].violation_type, ViolationType::InappropriateContent);
    assert_eq!(teen.violations[0].severity, ViolationSeverity::Medium);
    assert_eq!(teen.safety_level, SafetyLevel::Caution);

    // Adults accept warning-level content
    let adult = evaluator()
        .validate_learning_content(&content, "adult-1")
        .await
        .unwrap();
    assert!(adult.approved);
}

#[tokio::test]
async fn test_rejected_adult_content_never_needs_approval() {
    let content = LearningContent::new("c-5", ContentType::Story, SafetyLevel::Blocked)
        .with_text("explicit material");

    for user in ["adult-1", "senior-1"] {
        let result = evaluator().validate_learning_content(&content, user).await.unwrap();
        assert!(!result.approved);
        assert!(!result.requires_parental_approval);
    }
}

#[tokio::test]
async fn test_unknown_user_evaluated_as_child() {
    let content = LearningContent::new("c-6", ContentType::Routine, SafetyLevel::Safe);

    let result = evaluator()
        .validate_learning_content(&content, "nobody")
        .await
        .unwrap();

    assert!(!result.approved);
    assert_eq!(result.violations[0].age_group, AgeGroup::Child);
    assert!(result.requires_parental_approval);
}

#[tokio::test]
async fn test_provider_failure_degrades_to_rejection() {
    init_tracing();
    let evaluator = SafetyEvaluator::new(Arc::new(UnavailableProfiles));
    let content = LearningContent::new("c-7", ContentType::Educational, SafetyLevel::Safe);
    let adaptation = LearningAdaptation::new("a-7", "kid", AdaptationType::ResponseStyle, 0.99);

    let content_result = evaluator.validate_learning_content(&content, "kid").await.unwrap();
    assert!(!content_result.approved);
    assert!(content_result.requires_parental_approval);
    assert_eq!(content_result.violations.len(), 1);
    assert_eq!(content_result.violations[0].violation_type, ViolationType::EvaluationFailure);
    assert_eq!(content_result.violations[0].severity, ViolationSeverity::High);

    let adaptation_result = evaluator
        .validate_learning_adaptation(&adaptation, "kid")
        .await
        .unwrap();
    assert!(!adaptation_result.approved);
    assert!(adaptation_result.requires_parental_approval);

    assert!(evaluator.requires_parental_approval(&adaptation, "kid").await.unwrap());
    assert!(!evaluator.within_daily_adaptation_limit("kid", 0).await.unwrap());
}

// ============================================================================
// Adaptation Validation Tests
// ============================================================================

#[tokio::test]
async fn test_toddler_low_confidence_adaptation() {
    let adaptation =
        LearningAdaptation::new("a-1", "toddler-1", AdaptationType::ResponseStyle, 0.9);

    let result = evaluator()
        .validate_learning_adaptation(&adaptation, "toddler-1")
        .await
        .unwrap();

    assert!(!result.approved);
    assert!(result
        .violations
        .iter()
        .any(|v| v.description.contains("confidence")));
    assert!(result.requires_parental_approval);
}

#[tokio::test]
async fn test_disallowed_adaptation_type() {
    let adaptation =
        LearningAdaptation::new("a-2", "toddler-1", AdaptationType::TopicPreference, 0.99);

    let result = evaluator()
        .validate_learning_adaptation(&adaptation, "toddler-1")
        .await
        .unwrap();

    assert!(!result.approved);
    assert_eq!(result.violations[0].violation_type, ViolationType::AgeInappropriate);
    assert_eq!(result.violations[0].severity, ViolationSeverity::High);
}

#[tokio::test]
async fn test_high_risk_adaptation_violation_matches_risk() {
    let adaptation =
        LearningAdaptation::new("a-3", "child-1", AdaptationType::PersonalityAdjustment, 0.5)
            .with_impact(AdaptationImpact::new("personality", ImpactMagnitude::Major));

    let result = evaluator()
        .validate_learning_adaptation(&adaptation, "child-1")
        .await
        .unwrap();

    let concern = result
        .violations
        .iter()
        .find(|v| {
            v.violation_type == ViolationType::BehavioralConcern && v.description.contains("risk")
        })
        .unwrap();
    assert_eq!(concern.severity, ViolationSeverity::Critical);
    assert_eq!(result.safety_level, SafetyLevel::Blocked);
    assert!(result.requires_parental_approval);
}

#[tokio::test]
async fn test_teen_low_risk_adaptation_approved() {
    let adaptation = LearningAdaptation::new("a-4", "teen-1", AdaptationType::ResponseStyle, 0.95);

    let result = evaluator()
        .validate_learning_adaptation(&adaptation, "teen-1")
        .await
        .unwrap();

    assert!(result.approved);
    assert!(!result.requires_parental_approval);
}

#[tokio::test]
async fn test_elevated_upstream_risk_requires_approval() {
    let adaptation = LearningAdaptation::new("a-5", "teen-1", AdaptationType::ResponseStyle, 0.95)
        .with_risk(RiskAssessment::uniform(RiskLevel::High));

    let evaluator = evaluator();
    assert!(evaluator.requires_parental_approval(&adaptation, "teen-1").await.unwrap());

    let result = evaluator
        .validate_learning_adaptation(&adaptation, "teen-1")
        .await
        .unwrap();
    assert!(result.requires_parental_approval);
}

#[tokio::test]
async fn test_adult_and_senior_never_require_approval() {
    let evaluator = evaluator();
    let confidences = [0.0, 0.3, 0.69, 0.9, 1.0];
    let risks = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical];
    let magnitudes = [ImpactMagnitude::Minor, ImpactMagnitude::Moderate, ImpactMagnitude::Major];

    for user in ["adult-1", "senior-1"] {
        for adaptation_type in AdaptationType::ALL {
            for confidence in confidences {
                for risk in risks {
                    for magnitude in magnitudes {
                        let adaptation =
                            LearningAdaptation::new("a", user, adaptation_type, confidence)
                                .with_risk(RiskAssessment::uniform(risk))
                                .with_impact(AdaptationImpact::new("area", magnitude));

                        let needs_parent = evaluator
                            .requires_parental_approval(&adaptation, user)
                            .await
                            .unwrap();
                        assert!(!needs_parent);
                        let result = evaluator
                            .validate_learning_adaptation(&adaptation, user)
                            .await
                            .unwrap();
                        assert!(!result.requires_parental_approval);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Determinism and Monotonicity
// ============================================================================

#[tokio::test]
async fn test_evaluation_is_deterministic() {
    let evaluator = evaluator();
    let content = LearningContent::new("c-8", ContentType::Game, SafetyLevel::Caution)
        .with_text("Shut up, you idiot. This is dumb.");

    let first = evaluator.validate_learning_content(&content, "child-1").await.unwrap();
    let second = evaluator.validate_learning_content(&content, "child-1").await.unwrap();

    let summary = |r: &nestguard_core::SafetyValidationResult| {
        r.violations
            .iter()
            .map(|v| (v.violation_type, v.severity, v.description.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&first), summary(&second));
    assert_eq!(first.safety_level, second.safety_level);
    assert_eq!(first.recommendations, second.recommendations);
}

#[tokio::test]
async fn test_more_severe_text_never_improves_safety_level() {
    let evaluator = evaluator();
    let texts = [
        "A quiet walk in the park.",
        "A damn quiet walk in the park.",
        "A damn quiet walk in the park with alcohol.",
    ];

    let mut previous = SafetyLevel::Safe;
    for text in texts {
        let content =
            LearningContent::new("c-9", ContentType::Story, SafetyLevel::Safe).with_text(text);
        let result = evaluator.validate_learning_content(&content, "teen-1").await.unwrap();
        assert!(result.safety_level >= previous);
        previous = result.safety_level;
    }
    assert_eq!(previous, SafetyLevel::Blocked);
}

// ============================================================================
// Configured Catalog
// ============================================================================

#[tokio::test]
async fn test_evaluator_with_catalog_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rules.yaml");
    let mut yaml = String::from(
        "apiVersion: nestguard.dev/v1\nkind: SafetyRuleCatalog\nmetadata:\n  name: games-only\nspec:\n  rules:\n",
    );
    for group in AgeGroup::ALL {
        yaml.push_str(&format!(
            "    - age_group: {}\n      allowed_content_types: [game]\n      allowed_adaptation_types: [response_style]\n      min_safety_level: safe\n      min_confidence: 0.5\n      max_daily_adaptations: 1\n",
            group
        ));
    }
    std::fs::write(&path, yaml).unwrap();

    let catalog = RuleCatalog::from_yaml_file(&path).unwrap();
    let profiles =
        StaticProfileProvider::new().with_profile(UserProfile::new("kid", AgeGroup::Child));
    let evaluator = SafetyEvaluator::with_components(
        Arc::new(catalog),
        Arc::new(ContentPatternScanner::new()),
        Arc::new(profiles),
    );

    let story = LearningContent::new("c-10", ContentType::Story, SafetyLevel::Safe);
    assert!(!evaluator.validate_learning_content(&story, "kid").await.unwrap().approved);

    let game = LearningContent::new("c-11", ContentType::Game, SafetyLevel::Safe);
    assert!(evaluator.validate_learning_content(&game, "kid").await.unwrap().approved);

    assert!(evaluator.within_daily_adaptation_limit("kid", 0).await.unwrap());
    assert!(!evaluator.within_daily_adaptation_limit("kid", 1).await.unwrap());
}
