//! Safety Evaluator - Validate content and adaptations for a user
//!
//! The evaluator brings together:
//! - The user's age group (from the profile provider)
//! - The rule for that age group
//! - Text scanning
//! - Adaptation risk scoring
//!
//! Unknown users are treated as children. Provider failures produce a
//! rejection with an `evaluation_failure` violation rather than an error, so a
//! fault can never surface as an approval.

use std::sync::Arc;

use nestguard_core::{
    AdaptationType, AgeGroup, AuditAction, AuditEntry, LearningAdaptation, LearningContent,
    NestError, NestResult, RiskLevel, SafetyValidationResult, SafetyViolation,
    UserProfileProvider, ViolationSeverity, ViolationType,
};
use tracing::{debug, info, warn};

use crate::catalog::{RuleCatalog, SafetyRule};
use crate::scanner::{ContentIssue, ContentPatternScanner, IssueKind};

/// Actor name on evaluator audit entries
pub const EVALUATOR_ACTOR: &str = "safety_evaluator";

/// Confidence below this counts as a risk factor regardless of tier
pub const LOW_CONFIDENCE_RISK_THRESHOLD: f64 = 0.7;

/// Age group used when a user has no profile
pub const FALLBACK_AGE_GROUP: AgeGroup = AgeGroup::Child;

/// Evaluates learning content and adaptations against the rule catalog
#[derive(Clone)]
pub struct SafetyEvaluator {
    catalog: Arc<RuleCatalog>,
    scanner: Arc<ContentPatternScanner>,
    profiles: Arc<dyn UserProfileProvider>,
}

impl SafetyEvaluator {
    /// Create an evaluator with the built-in catalog and scanner
    pub fn new(profiles: Arc<dyn UserProfileProvider>) -> Self {
        Self::with_components(
            Arc::new(RuleCatalog::new()),
            Arc::new(ContentPatternScanner::new()),
            profiles,
        )
    }

    pub fn with_components(
        catalog: Arc<RuleCatalog>,
        scanner: Arc<ContentPatternScanner>,
        profiles: Arc<dyn UserProfileProvider>,
    ) -> Self {
        Self {
            catalog,
            scanner,
            profiles,
        }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn scanner(&self) -> &ContentPatternScanner {
        &self.scanner
    }

    /// Resolve a user's age group; missing profiles fall back to child
    pub async fn resolve_age_group(&self, user_id: &str) -> NestResult<AgeGroup> {
        match self.profiles.get_profile(user_id).await? {
            Some(profile) => Ok(profile.age_group),
            None => {
                warn!(
                    "No profile for user {}, evaluating as {}",
                    user_id, FALLBACK_AGE_GROUP
                );
                Ok(FALLBACK_AGE_GROUP)
            }
        }
    }

    /// Validate a piece of learning content for a user
    ///
    /// Only a configuration error is returned as `Err`.
    pub async fn validate_learning_content(
        &self,
        content: &LearningContent,
        user_id: &str,
    ) -> NestResult<SafetyValidationResult> {
        let age_group = match self.resolve_age_group(user_id).await {
            Ok(group) => group,
            Err(e) => return Ok(self.failure_result(&content.id, user_id, e)),
        };
        let rule = self.catalog.lookup(age_group)?;

        let mut violations = Vec::new();
        let mut recommendations = Vec::new();

        if !rule.allows_content(content.content_type) {
            violations.push(SafetyViolation::new(
                ViolationType::AgeInappropriate,
                ViolationSeverity::High,
                format!(
                    "Content type {} is not allowed for {} users",
                    content.content_type, age_group
                ),
                age_group,
                "Block this content or ask a parent to approve it",
            ));
        }

        if let Some(text) = content.text.as_deref().filter(|t| !t.trim().is_empty()) {
            let report = self.scanner.scan(text);
            debug!(
                "Scanned content {}: score {:.2}, {} issues",
                content.id,
                report.safety_score,
                report.issues.len()
            );
            violations.extend(report.issues.iter().map(|i| issue_violation(i, age_group)));
            recommendations.extend(report.recommendations);
        }

        if !content.safety_level.meets(rule.min_safety_level) {
            violations.push(SafetyViolation::new(
                ViolationType::InappropriateContent,
                ViolationSeverity::Medium,
                format!(
                    "Declared safety level {} is below the minimum {} for {} users",
                    content.safety_level, rule.min_safety_level, age_group
                ),
                age_group,
                "Use content rated for this age group",
            ));
        }

        let approved = violations.is_empty();
        let requires_parental_approval = !approved && !age_group.is_self_governing();
        add_violation_actions(&mut recommendations, &violations);

        let audit = AuditEntry::new(
            if approved { AuditAction::Approved } else { AuditAction::Rejected },
            EVALUATOR_ACTOR,
            format!(
                "Content {} for user {} ({}): {} violations",
                content.id,
                user_id,
                age_group,
                violations.len()
            ),
        );

        info!(
            "Content {} {} for user {}",
            content.id,
            if approved { "approved" } else { "rejected" },
            user_id
        );

        Ok(SafetyValidationResult::from_violations(
            violations,
            recommendations,
            requires_parental_approval,
            audit,
        ))
    }

    /// Validate a proposed adaptation for a user
    pub async fn validate_learning_adaptation(
        &self,
        adaptation: &LearningAdaptation,
        user_id: &str,
    ) -> NestResult<SafetyValidationResult> {
        let age_group = match self.resolve_age_group(user_id).await {
            Ok(group) => group,
            Err(e) => return Ok(self.failure_result(&adaptation.id, user_id, e)),
        };
        let rule = self.catalog.lookup(age_group)?;

        let mut violations = Vec::new();

        if !rule.allows_adaptation(adaptation.adaptation_type) {
            violations.push(SafetyViolation::new(
                ViolationType::AgeInappropriate,
                ViolationSeverity::High,
                format!(
                    "Adaptation type {} is not allowed for {} users",
                    adaptation.adaptation_type, age_group
                ),
                age_group,
                "Discard this adaptation",
            ));
        }

        let risk = assess_risk(adaptation, age_group);
        if risk.is_elevated() {
            violations.push(SafetyViolation::new(
                ViolationType::BehavioralConcern,
                risk.as_severity(),
                format!("Adaptation {} carries {} risk", adaptation.id, risk),
                age_group,
                "Ask a parent to review this adaptation",
            ));
        }

        let confidence = adaptation.effective_confidence();
        if !rule.confidence_meets(confidence) {
            violations.push(SafetyViolation::new(
                ViolationType::BehavioralConcern,
                ViolationSeverity::Medium,
                format!(
                    "Adaptation confidence {:.2} is below the {:.2} threshold for {} users",
                    confidence, rule.min_confidence, age_group
                ),
                age_group,
                "Collect more observations before applying this adaptation",
            ));
        }

        let requires_parental_approval = approval_policy(adaptation, age_group, rule);
        let mut recommendations = Vec::new();
        add_violation_actions(&mut recommendations, &violations);

        let approved = violations.is_empty();
        let audit = AuditEntry::new(
            if approved { AuditAction::Approved } else { AuditAction::Rejected },
            EVALUATOR_ACTOR,
            format!(
                "Adaptation {} ({}) for user {} ({}): risk {}, {} violations",
                adaptation.id,
                adaptation.adaptation_type,
                user_id,
                age_group,
                risk,
                violations.len()
            ),
        );

        info!(
            "Adaptation {} {} for user {} (approval required: {})",
            adaptation.id,
            if approved { "approved" } else { "rejected" },
            user_id,
            requires_parental_approval
        );

        Ok(SafetyValidationResult::from_violations(
            violations,
            recommendations,
            requires_parental_approval,
            audit,
        ))
    }

    /// Whether applying `adaptation` for `user_id` needs a parent's approval
    ///
    /// An unreachable profile provider answers true.
    pub async fn requires_parental_approval(
        &self,
        adaptation: &LearningAdaptation,
        user_id: &str,
    ) -> NestResult<bool> {
        let age_group = match self.resolve_age_group(user_id).await {
            Ok(group) => group,
            Err(e) => {
                warn!("Profile lookup failed for user {}: {}", user_id, e);
                return Ok(true);
            }
        };
        let rule = self.catalog.lookup(age_group)?;
        Ok(approval_policy(adaptation, age_group, rule))
    }

    /// Whether one more adaptation may be applied today
    ///
    /// An unreachable profile provider answers false.
    pub async fn within_daily_adaptation_limit(
        &self,
        user_id: &str,
        applied_today: u32,
    ) -> NestResult<bool> {
        let age_group = match self.resolve_age_group(user_id).await {
            Ok(group) => group,
            Err(e) => {
                warn!("Profile lookup failed for user {}: {}", user_id, e);
                return Ok(false);
            }
        };
        Ok(self.catalog.lookup(age_group)?.within_daily_limit(applied_today))
    }

    /// Rejection for an evaluation that could not complete
    ///
    /// The age group is unknown, so approval is always required.
    fn failure_result(
        &self,
        subject_id: &str,
        user_id: &str,
        error: NestError,
    ) -> SafetyValidationResult {
        warn!(
            "Safety evaluation of {} for user {} failed: {}",
            subject_id, user_id, error
        );
        let violation = SafetyViolation::new(
            ViolationType::EvaluationFailure,
            ViolationSeverity::High,
            format!("Safety evaluation could not complete: {}", error),
            FALLBACK_AGE_GROUP,
            "Retry the evaluation or ask a parent to review",
        );
        let recommendations = vec![violation.recommended_action.clone()];
        SafetyValidationResult::from_violations(
            vec![violation],
            recommendations,
            true,
            AuditEntry::new(
                AuditAction::Rejected,
                EVALUATOR_ACTOR,
                format!("Evaluation of {} for user {} failed", subject_id, user_id),
            ),
        )
    }
}

/// Count risk factors for an adaptation
///
/// Factors: personality adjustment for a child, confidence under 0.7, and a
/// major behavior change.
pub fn assess_risk(adaptation: &LearningAdaptation, age_group: AgeGroup) -> RiskLevel {
    let mut factors = 0;
    if age_group == AgeGroup::Child
        && adaptation.adaptation_type == AdaptationType::PersonalityAdjustment
    {
        factors += 1;
    }
    if adaptation.effective_confidence() < LOW_CONFIDENCE_RISK_THRESHOLD {
        factors += 1;
    }
    if adaptation.impact.is_major_behavior_change() {
        factors += 1;
    }
    RiskLevel::from_factor_count(factors)
}

fn approval_policy(
    adaptation: &LearningAdaptation,
    age_group: AgeGroup,
    rule: &SafetyRule,
) -> bool {
    if age_group.is_self_governing() {
        return false;
    }
    if adaptation.risk_assessment.overall.is_elevated() {
        return true;
    }
    if !rule.confidence_meets(adaptation.effective_confidence()) {
        return true;
    }
    age_group == AgeGroup::Child
        && matches!(
            adaptation.adaptation_type,
            AdaptationType::PersonalityAdjustment | AdaptationType::InteractionPattern
        )
}

fn issue_violation(issue: &ContentIssue, age_group: AgeGroup) -> SafetyViolation {
    let violation_type = match issue.kind {
        IssueKind::InappropriateLanguage | IssueKind::ViolentContent => {
            ViolationType::InappropriateContent
        }
        IssueKind::AdultThemes => ViolationType::AgeInappropriate,
        IssueKind::PrivacyConcern => ViolationType::PrivacyViolation,
        IssueKind::BehavioralInfluence => ViolationType::BehavioralConcern,
    };
    SafetyViolation::new(
        violation_type,
        issue.severity,
        issue.description.clone(),
        age_group,
        issue.kind.recommendation(),
    )
    .with_excerpt(issue.excerpt.clone())
}

fn add_violation_actions(recommendations: &mut Vec<String>, violations: &[SafetyViolation]) {
    for violation in violations {
        if !recommendations.contains(&violation.recommended_action) {
            recommendations.push(violation.recommended_action.clone());
        }
    }
}
