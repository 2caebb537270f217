//! Guardian - Wires the evaluator, audit log, workflow and notifications
//!
//! The host hands content and adaptations to the guardian; the guardian
//! evaluates them, records the decision, and routes anything needing a
//! parent into the approval workflow.

use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nestguard_core::{
    ChildLearningProfileStore, Clock, DecisionType, LearningContent, LearningRecommendation,
    NestResult, NestguardConfig, NotificationChannel, NotificationPriority, NotificationType,
    ParentalApprovalRequest, ParentalNotification, SafetyDecision, Store, SystemClock,
    UserProfileProvider, Urgency,
};
use nestguard_safety::{ContentPatternScanner, RuleCatalog, SafetyEvaluator};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditReport, CriticalAlertSink};
use crate::notify::NotificationScheduler;
use crate::repository::{ApprovalRepository, SettingsRepository};
use crate::workflow::ApprovalWorkflow;

/// Outcome of routing one item through the guardian
#[derive(Debug, Clone)]
pub struct SafetyReview {
    pub decision: SafetyDecision,
    /// Approval request opened for a parent, if any
    pub request: Option<ParentalApprovalRequest>,
    /// The adaptation was applied to the child's profile
    pub applied: bool,
    /// The child already used today's adaptation budget
    pub daily_limit_reached: bool,
}

impl SafetyReview {
    fn new(decision: SafetyDecision) -> Self {
        Self {
            decision,
            request: None,
            applied: false,
            daily_limit_reached: false,
        }
    }
}

pub struct Guardian {
    evaluator: SafetyEvaluator,
    audit: Arc<AuditLog>,
    notifier: Arc<NotificationScheduler>,
    workflow: Arc<ApprovalWorkflow>,
    settings: SettingsRepository,
    clock: Arc<dyn Clock>,
    config: NestguardConfig,
}

impl Guardian {
    /// Build from a configuration resource with the system clock
    ///
    /// Opens the configured store, loads `rules_file` when set, and recovers
    /// persisted state.
    pub async fn from_config(
        config: NestguardConfig,
        profiles: Arc<dyn UserProfileProvider>,
        learning: Arc<dyn ChildLearningProfileStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> NestResult<Self> {
        let store = nestguard_memory::open_store(&config.spec.storage).await?;
        let catalog = match &config.spec.rules_file {
            Some(path) => {
                info!("Loading safety rules from {}", path);
                RuleCatalog::from_yaml_file(path)?
            }
            None => RuleCatalog::new(),
        };
        let evaluator = SafetyEvaluator::with_components(
            Arc::new(catalog),
            Arc::new(ContentPatternScanner::new()),
            profiles,
        );

        Self::assemble(config, store, evaluator, learning, channels, Arc::new(SystemClock)).await
    }

    /// Build from explicit components and recover persisted state
    ///
    /// Channel kinds without a registered channel fall back to tracing.
    pub async fn assemble(
        config: NestguardConfig,
        store: Arc<dyn Store>,
        evaluator: SafetyEvaluator,
        learning: Arc<dyn ChildLearningProfileStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        clock: Arc<dyn Clock>,
    ) -> NestResult<Self> {
        let settings = SettingsRepository::new(store.clone(), clock.clone());
        let audit = Arc::new(AuditLog::new(store.clone()));

        let mut scheduler = NotificationScheduler::new(
            store.clone(),
            settings.clone(),
            audit.clone(),
            clock.clone(),
        );
        for channel in channels {
            scheduler.register_channel(channel);
        }
        let notifier = Arc::new(
            scheduler
                .with_tracing_channels()
                .with_delivery_timeout(config.delivery_timeout()),
        );
        let sink: Arc<dyn CriticalAlertSink> = notifier.clone();
        audit.set_alert_sink(Arc::downgrade(&sink));

        let workflow = Arc::new(
            ApprovalWorkflow::new(
                ApprovalRepository::new(store),
                settings.clone(),
                audit.clone(),
                notifier.clone(),
                learning,
                clock.clone(),
            )
            .with_retention(config.decided_retention()),
        );

        let guardian = Self {
            evaluator,
            audit,
            notifier,
            workflow,
            settings,
            clock,
            config,
        };
        guardian.recover().await?;
        Ok(guardian)
    }

    /// Reload the audit log, inboxes and approval requests from the store
    pub async fn recover(&self) -> NestResult<()> {
        let decisions = self.audit.recover().await?;
        let notifications = self.notifier.inbox().recover().await?;
        let pending = self.workflow.recover().await?;
        info!(
            "Guardian recovered {} decisions, {} notifications, {} pending requests",
            decisions, notifications, pending
        );
        Ok(())
    }

    pub fn evaluator(&self) -> &SafetyEvaluator {
        &self.evaluator
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn notifier(&self) -> &Arc<NotificationScheduler> {
        &self.notifier
    }

    pub fn workflow(&self) -> &Arc<ApprovalWorkflow> {
        &self.workflow
    }

    pub fn settings(&self) -> &SettingsRepository {
        &self.settings
    }

    /// Evaluate content for a child and record the decision
    ///
    /// Content needing approval is flagged to the parent; no request is opened.
    /// The requesting parent's settings exist before the decision is recorded,
    /// so a critical alert always has that parent to reach.
    pub async fn review_content(
        &self,
        content: &LearningContent,
        child_id: &str,
        parent_id: &str,
    ) -> NestResult<SafetyReview> {
        let settings = self.settings.get_or_default(parent_id, child_id).await?;
        let result = self.evaluator.validate_learning_content(content, child_id).await?;
        let decision = SafetyDecision::new(
            child_id,
            DecisionType::ContentValidation,
            content.id.clone(),
            result,
            self.clock.now(),
        );
        self.audit.append(decision.clone()).await?;

        if decision.requires_approval {
            let notification = ParentalNotification::new(
                parent_id,
                child_id,
                NotificationType::ApprovalRequired,
                NotificationPriority::High,
                "Content needs review",
                format!(
                    "Content {} was held for review ({} safety level, {} violations)",
                    content.id,
                    decision.result.safety_level,
                    decision.result.violations.len()
                ),
            )
            .action_required()
            .at(self.clock.now());
            self.notifier.send(notification, &settings).await;
        }

        Ok(SafetyReview::new(decision))
    }

    /// Evaluate a recommendation's adaptation and route it
    ///
    /// - Over today's adaptation budget: recorded, nothing else
    /// - Approved without needing a parent: applied directly
    /// - Needing a parent: an approval request linked to the decision is
    ///   opened. Requests for rejected adaptations always wait for a parent.
    /// - Critical violations: recorded and alerted, never offered for approval
    pub async fn review_adaptation(
        &self,
        recommendation: LearningRecommendation,
        child_id: &str,
        parent_id: &str,
    ) -> NestResult<SafetyReview> {
        let now = self.clock.now();
        let mut settings = self.settings.get_or_default(parent_id, child_id).await?;
        let result = self
            .evaluator
            .validate_learning_adaptation(&recommendation.adaptation, child_id)
            .await?;
        let decision = SafetyDecision::new(
            child_id,
            DecisionType::AdaptationValidation,
            recommendation.adaptation.id.clone(),
            result,
            now,
        );
        self.audit.append(decision.clone()).await?;
        let mut review = SafetyReview::new(decision);

        let applied_today = self.workflow.adaptations_applied_today(child_id);
        if !self
            .evaluator
            .within_daily_adaptation_limit(child_id, applied_today)
            .await?
        {
            info!(
                "Child {} reached the daily adaptation limit ({} applied)",
                child_id, applied_today
            );
            review.daily_limit_reached = true;
            return Ok(review);
        }

        let result = &review.decision.result;
        if result.has_critical_violation() {
            warn!(
                "Adaptation {} for child {} has critical violations; not offered for approval",
                recommendation.adaptation.id, child_id
            );
            return Ok(review);
        }

        if !review.decision.requires_approval {
            if result.approved {
                review.applied = self
                    .workflow
                    .apply_adaptation(child_id, &recommendation.adaptation)
                    .await;
            } else {
                debug!(
                    "Adaptation {} rejected without approval path",
                    recommendation.adaptation.id
                );
            }
            return Ok(review);
        }

        let urgency = if result.approved {
            Urgency::Normal
        } else {
            settings.auto_approval.enabled = false;
            Urgency::High
        };
        let justification = if result.violations.is_empty() {
            "Parental approval required for this age group".to_string()
        } else {
            result
                .violations
                .iter()
                .map(|v| v.description.clone())
                .collect::<Vec<_>>()
                .join("; ")
        };

        let request = ParentalApprovalRequest::new(
            child_id,
            parent_id,
            recommendation,
            now,
            self.config.approval_ttl(),
        )
        .with_decision(review.decision.id.clone())
        .with_justification(justification)
        .with_urgency(urgency);

        let created = self.workflow.create(request, &settings).await?;
        review.applied = created.status.is_approved();
        review.request = Some(created);
        Ok(review)
    }

    /// Record a parent's decision on a request
    pub async fn decide(
        &self,
        request_id: &str,
        approver_id: &str,
        approved: bool,
        notes: Option<String>,
    ) -> NestResult<ParentalApprovalRequest> {
        self.workflow.decide(request_id, approver_id, approved, notes).await
    }

    pub fn report(&self, user_id: &str, range: Range<DateTime<Utc>>) -> AuditReport {
        self.audit.generate_report(user_id, range)
    }

    /// Start the expiration task, quiet hours release and digest jobs
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let tick = self.config.expiration_tick();
        let mut handles = vec![
            Arc::clone(&self.workflow).spawn_expiration_task(tick),
            Arc::clone(&self.notifier).spawn_quiet_hours_release(tick),
        ];
        handles.extend(Arc::clone(&self.notifier).spawn_digest_jobs(
            self.config.daily_digest_interval(),
            self.config.weekly_digest_interval(),
        ));
        handles
    }
}
