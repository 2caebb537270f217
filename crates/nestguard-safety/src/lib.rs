//! Nestguard Safety - Age-tiered rules, content scanning and evaluation
//!
//! This crate provides:
//! - A rule catalog with one rule per age group (built-in or YAML-loaded)
//! - A pattern scanner for free text
//! - The evaluator that validates content and adaptations for a user
//!
//! Design Philosophy:
//! - Fail safe: Unknown users are children, failed evaluations are rejections
//! - Deterministic: The same inputs produce the same violations
//! - Adults self-govern: Adult and senior users never need parental approval

mod catalog;
mod evaluator;
mod scanner;

pub use catalog::{
    CatalogMetadata, CatalogSpec, RuleCatalog, RuleCatalogConfig, SafetyRule, RULE_CATALOG_KIND,
};
pub use evaluator::{
    assess_risk, SafetyEvaluator, EVALUATOR_ACTOR, FALLBACK_AGE_GROUP,
    LOW_CONFIDENCE_RISK_THRESHOLD,
};
pub use scanner::{
    AgeAppropriateness, ContentIssue, ContentPatternScanner, IssueKind, ScanReport,
    ScannerPatterns, DEFAULT_MIN_AGE, SAFE_SCORE_THRESHOLD,
};
