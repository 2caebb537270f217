//! Content Pattern Scanner - Detect unsuitable language in free text
//!
//! Scans text against pattern sets, one per issue kind:
//! - inappropriate_language: Rude or profane wording
//! - adult_themes: Keywords for content meant for adults only
//! - violent_content: Violent descriptions (no defaults)
//! - privacy_concern: Requests for personal details (no defaults)
//! - behavioral_influence: Manipulative prompts (no defaults)
//!
//! Scanning is pure: the same text always yields the same report.

use nestguard_core::{NestError, NestResult, ViolationSeverity};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum age when no issue raises it
pub const DEFAULT_MIN_AGE: u32 = 5;

/// Score below which text is unsafe even without issues
pub const SAFE_SCORE_THRESHOLD: f64 = 0.8;

/// Kind of issue found in text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    InappropriateLanguage,
    ViolentContent,
    AdultThemes,
    PrivacyConcern,
    BehavioralInfluence,
}

impl IssueKind {
    pub fn severity(&self) -> ViolationSeverity {
        match self {
            Self::InappropriateLanguage => ViolationSeverity::High,
            Self::ViolentContent => ViolationSeverity::High,
            Self::AdultThemes => ViolationSeverity::Critical,
            Self::PrivacyConcern => ViolationSeverity::High,
            Self::BehavioralInfluence => ViolationSeverity::Medium,
        }
    }

    /// Amount subtracted from the safety score per match
    pub fn penalty(&self) -> f64 {
        match self {
            Self::InappropriateLanguage | Self::ViolentContent | Self::PrivacyConcern => 0.3,
            Self::AdultThemes => 0.5,
            Self::BehavioralInfluence => 0.2,
        }
    }

    /// Minimum audience age implied by this kind, if any
    pub fn min_age(&self) -> Option<u32> {
        match self {
            Self::InappropriateLanguage => Some(13),
            Self::ViolentContent => Some(16),
            Self::AdultThemes => Some(18),
            Self::PrivacyConcern | Self::BehavioralInfluence => None,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::InappropriateLanguage => {
                "Replace inappropriate language with age-appropriate wording"
            }
            Self::ViolentContent => "Remove or soften violent descriptions",
            Self::AdultThemes => "Remove adult themes or restrict the content to adult audiences",
            Self::PrivacyConcern => "Remove requests for personal information",
            Self::BehavioralInfluence => "Rephrase content that pressures the user to act",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InappropriateLanguage => write!(f, "inappropriate language"),
            Self::ViolentContent => write!(f, "violent content"),
            Self::AdultThemes => write!(f, "adult themes"),
            Self::PrivacyConcern => write!(f, "privacy concern"),
            Self::BehavioralInfluence => write!(f, "behavioral influence"),
        }
    }
}

/// One match found in the scanned text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentIssue {
    pub kind: IssueKind,
    pub severity: ViolationSeverity,
    pub description: String,
    /// The matched text
    pub excerpt: String,
}

impl ContentIssue {
    fn new(kind: IssueKind, excerpt: &str) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            description: format!("Detected {}: \"{}\"", kind, excerpt),
            excerpt: excerpt.to_string(),
        }
    }
}

/// Suggested audience for the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeAppropriateness {
    pub recommended_min_age: u32,
}

impl AgeAppropriateness {
    pub fn suitable_for(&self, age: u32) -> bool {
        age >= self.recommended_min_age
    }
}

/// Result of scanning one text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub is_safe: bool,
    /// Starts at 1.0, reduced per match, floored at 0
    pub safety_score: f64,
    pub issues: Vec<ContentIssue>,
    pub age_appropriateness: AgeAppropriateness,
    pub recommendations: Vec<String>,
}

impl ScanReport {
    pub fn has_kind(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Pattern sets used by the scanner
///
/// `inappropriate_language`, `violent_content`, `privacy_concern` and
/// `behavioral_influence` are regular expressions. `adult_themes` are plain
/// keywords matched case-insensitively on word boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerPatterns {
    #[serde(default)]
    pub inappropriate_language: Vec<String>,
    #[serde(default)]
    pub adult_themes: Vec<String>,
    #[serde(default)]
    pub violent_content: Vec<String>,
    #[serde(default)]
    pub privacy_concern: Vec<String>,
    #[serde(default)]
    pub behavioral_influence: Vec<String>,
}

impl Default for ScannerPatterns {
    fn default() -> Self {
        Self {
            inappropriate_language: vec![
                r"(?i)\bdamn\b".to_string(),
                r"(?i)\bhell\b".to_string(),
                r"(?i)\bcrap\b".to_string(),
                r"(?i)\bstupid\b".to_string(),
                r"(?i)\bidiot(s|ic)?\b".to_string(),
                r"(?i)\bdumb\b".to_string(),
                r"(?i)\bshut\s+up\b".to_string(),
            ],
            adult_themes: vec![
                "sexual".to_string(),
                "nudity".to_string(),
                "explicit".to_string(),
                "drugs".to_string(),
                "alcohol".to_string(),
                "gambling".to_string(),
                "porn".to_string(),
            ],
            violent_content: vec![],
            privacy_concern: vec![],
            behavioral_influence: vec![],
        }
    }
}

/// Scanner over compiled pattern sets
#[derive(Debug, Clone)]
pub struct ContentPatternScanner {
    language: Vec<Regex>,
    adult_themes: Vec<Regex>,
    violent: Vec<Regex>,
    privacy: Vec<Regex>,
    behavioral: Vec<Regex>,
}

impl ContentPatternScanner {
    /// Create a scanner with the default patterns
    pub fn new() -> Self {
        let patterns = ScannerPatterns::default();
        Self {
            language: Self::compile_lenient(&patterns.inappropriate_language),
            adult_themes: Self::compile_lenient(&Self::keyword_patterns(&patterns.adult_themes)),
            violent: Self::compile_lenient(&patterns.violent_content),
            privacy: Self::compile_lenient(&patterns.privacy_concern),
            behavioral: Self::compile_lenient(&patterns.behavioral_influence),
        }
    }

    /// Create a scanner with custom patterns
    ///
    /// Fails with a validation error on the first pattern that does not compile.
    pub fn with_patterns(patterns: ScannerPatterns) -> NestResult<Self> {
        Ok(Self {
            language: Self::compile(&patterns.inappropriate_language)?,
            adult_themes: Self::compile(&Self::keyword_patterns(&patterns.adult_themes))?,
            violent: Self::compile(&patterns.violent_content)?,
            privacy: Self::compile(&patterns.privacy_concern)?,
            behavioral: Self::compile(&patterns.behavioral_influence)?,
        })
    }

    /// Scan text
    pub fn scan(&self, text: &str) -> ScanReport {
        let mut issues = Vec::new();
        let mut score: f64 = 1.0;

        for (kind, patterns) in self.pattern_sets() {
            for pattern in patterns {
                for m in pattern.find_iter(text) {
                    score = (score - kind.penalty()).max(0.0);
                    issues.push(ContentIssue::new(kind, m.as_str()));
                }
            }
        }

        let is_safe = issues.is_empty() && score >= SAFE_SCORE_THRESHOLD;
        let recommended_min_age = issues
            .iter()
            .filter_map(|i| i.kind.min_age())
            .max()
            .unwrap_or(DEFAULT_MIN_AGE);

        let mut recommendations: Vec<String> = Vec::new();
        for issue in &issues {
            let rec = issue.kind.recommendation();
            if !recommendations.iter().any(|r| r == rec) {
                recommendations.push(rec.to_string());
            }
        }
        if !is_safe {
            recommendations
                .push("Have a parent review this content before it is shown".to_string());
        }

        ScanReport {
            is_safe,
            safety_score: score,
            issues,
            age_appropriateness: AgeAppropriateness { recommended_min_age },
            recommendations,
        }
    }

    fn pattern_sets(&self) -> [(IssueKind, &[Regex]); 5] {
        [
            (IssueKind::InappropriateLanguage, self.language.as_slice()),
            (IssueKind::AdultThemes, self.adult_themes.as_slice()),
            (IssueKind::ViolentContent, self.violent.as_slice()),
            (IssueKind::PrivacyConcern, self.privacy.as_slice()),
            (IssueKind::BehavioralInfluence, self.behavioral.as_slice()),
        ]
    }

    /// Turn plain keywords into case-insensitive whole-word patterns
    fn keyword_patterns(keywords: &[String]) -> Vec<String> {
        keywords
            .iter()
            .map(|k| format!(r"(?i)\b{}\b", regex::escape(k.trim())))
            .collect()
    }

    fn compile(patterns: &[String]) -> NestResult<Vec<Regex>> {
        patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    NestError::validation(format!("Invalid scanner pattern '{}': {}", p, e))
                })
            })
            .collect()
    }

    /// Compile regex patterns, skipping invalid ones
    fn compile_lenient(patterns: &[String]) -> Vec<Regex> {
        patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Skipping invalid scanner pattern '{}': {}", p, e);
                    None
                }
            })
            .collect()
    }
}

impl Default for ContentPatternScanner {
    fn default() -> Self {
        Self::new()
    }
}
