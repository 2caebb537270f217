// Nestguard Core - Foundation types and traits for the child-safety engine
//
// Domain types shared by the evaluator and the approval workflow, the common
// error type, configuration, and the collaborator traits hosts implement.

pub mod approval;
pub mod clock;
pub mod config;
pub mod error;
pub mod learning;
pub mod notification;
pub mod profile;
pub mod safety;
pub mod settings;
pub mod store;

// Re-export core types
pub use approval::{ApprovalStatus, ParentalApprovalRequest, Urgency};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApprovalConfig, ConfigSpec, NestguardConfig, NotificationConfig, StorageConfig};
pub use error::{NestError, NestResult};
pub use learning::{
    AdaptationImpact, AdaptationType, ContentContext, ContentType, ImpactMagnitude,
    LearningAdaptation, LearningContent, LearningRecommendation, RiskAssessment, SkillLevel,
    SupervisionLevel,
};
pub use notification::{
    ChannelKind, NotificationChannel, NotificationPriority, NotificationType, ParentalNotification,
};
pub use profile::{
    ChildLearningProfileStore, StaticProfileProvider, UserProfile, UserProfileProvider,
};
pub use safety::{
    AgeGroup, AuditAction, AuditEntry, DecisionType, RiskLevel, SafetyDecision, SafetyLevel,
    SafetyValidationResult, SafetyViolation, ViolationSeverity, ViolationType,
};
pub use settings::{
    AutoApprovalCriteria, AutoApprovalSettings, ContentFilterLevel, NotificationPreferences,
    ParentalControlSettings, QuietHours,
};
pub use store::{Store, StoreEntry};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
