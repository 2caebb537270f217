//! Approval Workflow - Parental approval requests and their lifecycle
//!
//! A request starts `pending` (or is auto-approved on creation) and moves to
//! exactly one terminal state. Parental decisions and expiration race on the
//! same compare-and-swap status cell; whichever lands first wins and the
//! other observes a terminal status.
//!
//! # Example
//!
//! ```ignore
//! let request = ParentalApprovalRequest::new("kid", "mom", recommendation, now, ttl);
//! let created = workflow.create(request, &settings).await?;
//! workflow.decide(&created.id, "mom", true, None).await?;
//! ```

mod expiration;
mod status;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use nestguard_core::{
    ApprovalStatus, AuditAction, AuditEntry, ChildLearningProfileStore, Clock, LearningAdaptation,
    LearningRecommendation, NestError, NestResult, NotificationPriority, NotificationType,
    ParentalApprovalRequest, ParentalControlSettings, ParentalNotification, Urgency,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::notify::NotificationScheduler;
use crate::repository::{ApprovalRepository, SettingsRepository};

use expiration::ExpirationQueue;
use status::StatusCell;

const WORKFLOW_ACTOR: &str = "approval_workflow";
const AUTO_APPROVAL_ACTOR: &str = "auto_approval";

/// Default time a decided request stays in memory
fn default_retention() -> chrono::Duration {
    chrono::Duration::days(7)
}

struct TrackedRequest {
    status: StatusCell,
    request: Mutex<ParentalApprovalRequest>,
}

impl TrackedRequest {
    fn new(request: ParentalApprovalRequest) -> Self {
        Self {
            status: StatusCell::new(request.status),
            request: Mutex::new(request),
        }
    }

    /// Current request with the authoritative status
    fn snapshot(&self) -> ParentalApprovalRequest {
        let mut request = self.request.lock().clone();
        request.status = self.status.load();
        request
    }
}

/// In-memory index of approval requests
///
/// Pending requests stay until they reach a terminal state; decided requests
/// are pruned once older than the retention window and remain in the store.
pub struct ApprovalWorkflow {
    requests: DashMap<String, Arc<TrackedRequest>>,
    retention: chrono::Duration,
    repository: ApprovalRepository,
    settings: SettingsRepository,
    audit: Arc<AuditLog>,
    notifier: Arc<NotificationScheduler>,
    learning: Arc<dyn ChildLearningProfileStore>,
    clock: Arc<dyn Clock>,
    expirations: Mutex<ExpirationQueue>,
    /// Adaptations applied per child on the current day
    applied: DashMap<String, (NaiveDate, u32)>,
}

impl ApprovalWorkflow {
    pub fn new(
        repository: ApprovalRepository,
        settings: SettingsRepository,
        audit: Arc<AuditLog>,
        notifier: Arc<NotificationScheduler>,
        learning: Arc<dyn ChildLearningProfileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests: DashMap::new(),
            retention: default_retention(),
            repository,
            settings,
            audit,
            notifier,
            learning,
            clock,
            expirations: Mutex::new(ExpirationQueue::default()),
            applied: DashMap::new(),
        }
    }

    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Create a request under the given settings
    ///
    /// Requests that are already expired are rejected and never stored.
    /// Requests meeting the auto-approval criteria are approved immediately
    /// and their adaptation applied; everything else waits for a parent.
    pub async fn create(
        &self,
        request: ParentalApprovalRequest,
        settings: &ParentalControlSettings,
    ) -> NestResult<ParentalApprovalRequest> {
        let now = self.clock.now();
        if request.is_expired_at(now) {
            warn!(
                "Rejected approval request {} which expired at {}",
                request.id, request.expires_at
            );
            return Err(NestError::ExpiredRequest {
                request_id: request.id,
                expires_at: request.expires_at,
            });
        }
        if request.status != ApprovalStatus::Pending {
            return Err(NestError::InvalidState {
                request_id: request.id,
                status: request.status,
            });
        }
        if request.parent_id != settings.parent_id || request.child_id != settings.child_id {
            return Err(NestError::validation(format!(
                "Request {} is for {}/{} but settings are for {}",
                request.id,
                request.parent_id,
                request.child_id,
                settings.key()
            )));
        }
        if self.requests.contains_key(&request.id) {
            return Err(NestError::validation(format!("Request {} already exists", request.id)));
        }

        if settings.auto_approval.enabled && can_auto_approve(&request.recommendation, settings) {
            return self.auto_approve(request, settings, now).await;
        }

        self.repository.save(&request).await?;
        self.requests
            .insert(request.id.clone(), Arc::new(TrackedRequest::new(request.clone())));
        self.expirations.lock().schedule(request.expires_at, request.id.clone());
        info!(
            "Created approval request {} for child {} (expires {})",
            request.id, request.child_id, request.expires_at
        );

        self.record_event(
            &request.child_id,
            AuditAction::ApprovalRequested,
            WORKFLOW_ACTOR,
            format!(
                "Approval requested from {} for '{}'",
                request.parent_id, request.recommendation.title
            ),
        )
        .await;

        let notification = ParentalNotification::new(
            request.parent_id.clone(),
            request.child_id.clone(),
            NotificationType::ApprovalRequired,
            urgency_priority(request.urgency),
            "Approval needed",
            format!(
                "'{}' ({}, {} minutes) is waiting for your approval",
                request.recommendation.title,
                request.recommendation.subject,
                request.recommendation.estimated_duration_minutes
            ),
        )
        .action_required()
        .for_request(request.id.clone())
        .at(now);
        self.notifier.send(notification, settings).await;

        Ok(request)
    }

    async fn auto_approve(
        &self,
        mut request: ParentalApprovalRequest,
        settings: &ParentalControlSettings,
        now: DateTime<Utc>,
    ) -> NestResult<ParentalApprovalRequest> {
        request.status = ApprovalStatus::AutoApproved;
        request.auto_approval_reason = Some(format!(
            "Auto-approved: '{}' meets the criteria configured by {}",
            request.recommendation.title, settings.parent_id
        ));
        request.approver_id = Some(settings.parent_id.clone());
        request.decided_at = Some(now);

        self.repository.save(&request).await?;
        self.requests
            .insert(request.id.clone(), Arc::new(TrackedRequest::new(request.clone())));
        info!("Auto-approved request {} for child {}", request.id, request.child_id);

        self.record_event(
            &request.child_id,
            AuditAction::ApprovalGranted,
            AUTO_APPROVAL_ACTOR,
            request.auto_approval_reason.clone().unwrap_or_default(),
        )
        .await;
        self.record_decision_approval(&request, &settings.parent_id, now).await;
        self.apply_adaptation(&request.child_id, &request.recommendation.adaptation).await;

        let notification = ParentalNotification::new(
            request.parent_id.clone(),
            request.child_id.clone(),
            NotificationType::AutoApproved,
            NotificationPriority::Low,
            "Activity auto-approved",
            format!("'{}' was approved automatically", request.recommendation.title),
        )
        .for_request(request.id.clone())
        .at(now);
        self.notifier.send(notification, settings).await;

        Ok(request)
    }

    /// Record a parent's decision on a pending request
    pub async fn decide(
        &self,
        request_id: &str,
        approver_id: &str,
        approved: bool,
        notes: Option<String>,
    ) -> NestResult<ParentalApprovalRequest> {
        let tracked = self.tracked(request_id)?;
        let (parent_id, child_id) = {
            let request = tracked.request.lock();
            (request.parent_id.clone(), request.child_id.clone())
        };
        if approver_id != parent_id {
            warn!("Approver {} is not the parent on request {}", approver_id, request_id);
            return Err(NestError::Authorization {
                approver_id: approver_id.to_string(),
                child_id,
            });
        }

        let target = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        tracked
            .status
            .transition(ApprovalStatus::Pending, target)
            .map_err(|observed| NestError::InvalidState {
                request_id: request_id.to_string(),
                status: observed,
            })?;

        let now = self.clock.now();
        let (previous, decided) = {
            let mut request = tracked.request.lock();
            let previous = request.clone();
            request.status = target;
            request.decided_at = Some(now);
            request.approver_id = Some(approver_id.to_string());
            request.parent_notes = notes;
            (previous, request.clone())
        };
        if let Err(e) = self.repository.save(&decided).await {
            error!("Failed to persist decision on request {}: {}", request_id, e);
            self.roll_back(&tracked, previous, target);
            return Err(e);
        }
        info!("Request {} {} by {}", request_id, target, approver_id);

        let (action, verdict) = if approved {
            (AuditAction::ApprovalGranted, "approved")
        } else {
            (AuditAction::ApprovalDenied, "rejected")
        };
        let mut details = format!(
            "'{}' {} by {}",
            decided.recommendation.title, verdict, approver_id
        );
        if let Some(notes) = &decided.parent_notes {
            details.push_str(&format!(": {}", notes));
        }
        self.record_event(&child_id, action, approver_id, details).await;

        if approved {
            self.apply_adaptation(&child_id, &decided.recommendation.adaptation).await;
            self.record_decision_approval(&decided, approver_id, now).await;
        }

        self.notify(
            ParentalNotification::new(
                parent_id,
                child_id,
                NotificationType::ApprovalDecision,
                NotificationPriority::Medium,
                format!("Activity {}", verdict),
                format!("You {} '{}'", verdict, decided.recommendation.title),
            )
            .for_request(request_id)
            .at(now),
        )
        .await;

        Ok(decided)
    }

    /// Expire a request that is still pending at or after its deadline
    ///
    /// Returns whether this call performed the transition. A failed write
    /// leaves the request pending and rescheduled.
    pub async fn expire(&self, request_id: &str) -> NestResult<bool> {
        let Some(tracked) = self.requests.get(request_id).map(|t| Arc::clone(t.value())) else {
            debug!("Ignoring expiration of unknown request {}", request_id);
            return Ok(false);
        };

        let now = self.clock.now();
        let expires_at = tracked.request.lock().expires_at;
        if now < expires_at {
            return Ok(false);
        }
        if let Err(observed) = tracked
            .status
            .transition(ApprovalStatus::Pending, ApprovalStatus::Expired)
        {
            debug!("Request {} already {}, not expiring", request_id, observed);
            return Ok(false);
        }

        let (previous, expired) = {
            let mut request = tracked.request.lock();
            let previous = request.clone();
            request.status = ApprovalStatus::Expired;
            request.decided_at = Some(now);
            (previous, request.clone())
        };
        if let Err(e) = self.repository.save(&expired).await {
            error!("Failed to persist expiration of request {}: {}", request_id, e);
            self.roll_back(&tracked, previous, ApprovalStatus::Expired);
            return Err(e);
        }
        info!("Request {} expired", request_id);

        self.record_event(
            &expired.child_id,
            AuditAction::ApprovalExpired,
            WORKFLOW_ACTOR,
            format!("'{}' expired without a decision", expired.recommendation.title),
        )
        .await;
        self.notify(
            ParentalNotification::new(
                expired.parent_id.clone(),
                expired.child_id.clone(),
                NotificationType::RequestExpired,
                NotificationPriority::Medium,
                "Approval request expired",
                format!("'{}' expired before it was reviewed", expired.recommendation.title),
            )
            .for_request(request_id)
            .at(now),
        )
        .await;

        Ok(true)
    }

    /// Whether the recommendation meets the settings' auto-approval criteria
    pub fn can_auto_approve(
        &self,
        recommendation: &LearningRecommendation,
        settings: &ParentalControlSettings,
    ) -> bool {
        can_auto_approve(recommendation, settings)
    }

    pub fn get(&self, request_id: &str) -> Option<ParentalApprovalRequest> {
        self.requests.get(request_id).map(|t| t.snapshot())
    }

    /// Pending requests addressed to a parent, oldest first
    pub fn list_pending_for_parent(&self, parent_id: &str) -> Vec<ParentalApprovalRequest> {
        self.collect(|r| r.parent_id == parent_id && r.status == ApprovalStatus::Pending)
    }

    /// Every request for a child, oldest first
    pub fn list_for_child(&self, child_id: &str) -> Vec<ParentalApprovalRequest> {
        self.collect(|r| r.child_id == child_id)
    }

    /// Expire every request whose deadline has passed
    ///
    /// Returns the number of requests expired by this tick.
    pub async fn process_due_expirations(&self) -> usize {
        let due = self.expirations.lock().drain_due(self.clock.now());
        let mut expired = 0;
        for request_id in due {
            match self.expire(&request_id).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to expire request {}: {}", request_id, e),
            }
        }
        if expired > 0 {
            debug!("Expiration tick expired {} requests", expired);
        }
        expired
    }

    /// Scheduled expirations not yet processed
    pub fn scheduled_expirations(&self) -> usize {
        self.expirations.lock().len()
    }

    pub fn next_expiration(&self) -> Option<DateTime<Utc>> {
        self.expirations.lock().next_due()
    }

    /// Run `process_due_expirations` every `tick`
    pub fn spawn_expiration_task(self: Arc<Self>, tick: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                self.process_due_expirations().await;
                self.prune();
            }
        })
    }

    /// Reload requests from the store and reschedule pending expirations
    ///
    /// Replaces in-memory state. Returns the number of pending requests.
    pub async fn recover(&self) -> NestResult<usize> {
        let stored = self.repository.list_all().await?;
        self.requests.clear();
        let mut queue = ExpirationQueue::default();
        let mut pending = 0;

        for request in stored {
            if request.status == ApprovalStatus::Pending {
                queue.schedule(request.expires_at, request.id.clone());
                pending += 1;
            }
            self.requests
                .insert(request.id.clone(), Arc::new(TrackedRequest::new(request)));
        }
        *self.expirations.lock() = queue;
        self.prune();

        info!("Recovered {} requests ({} pending)", self.requests.len(), pending);
        Ok(pending)
    }

    /// Drop decided requests older than the retention window and stale
    /// daily adaptation counters
    ///
    /// Returns the number of requests dropped from memory.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let cutoff = now - self.retention;
        let mut pruned = 0;
        self.requests.retain(|_, tracked| {
            let keep = !tracked.status.load().is_terminal()
                || tracked.request.lock().decided_at.map_or(true, |at| at >= cutoff);
            if !keep {
                pruned += 1;
            }
            keep
        });

        let today = now.date_naive();
        self.applied.retain(|_, entry| entry.0 == today);

        if pruned > 0 {
            debug!("Pruned {} decided requests from memory", pruned);
        }
        pruned
    }

    /// Adaptations applied to a child today, by the workflow clock
    pub fn adaptations_applied_today(&self, child_id: &str) -> u32 {
        let today = self.clock.now().date_naive();
        self.applied
            .get(child_id)
            .filter(|entry| entry.0 == today)
            .map(|entry| entry.1)
            .unwrap_or(0)
    }

    /// Apply an approved adaptation to the child's learning profile
    ///
    /// Failures are logged; the approval stands either way.
    pub async fn apply_adaptation(&self, child_id: &str, adaptation: &LearningAdaptation) -> bool {
        match self.learning.apply_approved_adaptation(child_id, adaptation).await {
            Ok(()) => {
                let today = self.clock.now().date_naive();
                let mut entry = self.applied.entry(child_id.to_string()).or_insert((today, 0));
                if entry.0 != today {
                    *entry = (today, 0);
                }
                entry.1 += 1;
                info!("Applied adaptation {} for child {}", adaptation.id, child_id);
                true
            }
            Err(e) => {
                error!(
                    "Failed to apply adaptation {} for child {}: {}",
                    adaptation.id, child_id, e
                );
                false
            }
        }
    }

    fn tracked(&self, request_id: &str) -> NestResult<Arc<TrackedRequest>> {
        self.requests
            .get(request_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| NestError::not_found(format!("Approval request {}", request_id)))
    }

    fn collect(
        &self,
        keep: impl Fn(&ParentalApprovalRequest) -> bool,
    ) -> Vec<ParentalApprovalRequest> {
        let mut requests: Vec<_> = self
            .requests
            .iter()
            .map(|t| t.snapshot())
            .filter(|r| keep(r))
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        requests
    }

    /// Undo an unpersisted transition so the request is pending again
    fn roll_back(
        &self,
        tracked: &TrackedRequest,
        previous: ParentalApprovalRequest,
        from: ApprovalStatus,
    ) {
        let (request_id, expires_at) = (previous.id.clone(), previous.expires_at);
        *tracked.request.lock() = previous;
        if tracked.status.transition(from, ApprovalStatus::Pending).is_ok() {
            self.expirations.lock().schedule(expires_at, request_id);
        }
    }

    async fn record_event(
        &self,
        child_id: &str,
        action: AuditAction,
        actor: &str,
        details: String,
    ) {
        let mut entry = AuditEntry::new(action, actor, details);
        entry.timestamp = self.clock.now();
        if let Err(e) = self.audit.record_event(child_id, entry).await {
            warn!("Failed to record {:?} event for {}: {}", action, child_id, e);
        }
    }

    async fn record_decision_approval(
        &self,
        request: &ParentalApprovalRequest,
        approver_id: &str,
        at: DateTime<Utc>,
    ) {
        let Some(decision_id) = &request.decision_id else {
            return;
        };
        if let Err(e) = self
            .audit
            .record_approval(&request.child_id, decision_id, approver_id, at)
            .await
        {
            warn!("Failed to record approval of decision {}: {}", decision_id, e);
        }
    }

    async fn notify(&self, notification: ParentalNotification) {
        match self
            .settings
            .get_or_default(&notification.parent_id, &notification.child_id)
            .await
        {
            Ok(settings) => {
                self.notifier.send(notification, &settings).await;
            }
            Err(e) => warn!(
                "Dropping notification {} for parent {}: {}",
                notification.id, notification.parent_id, e
            ),
        }
    }
}

/// Whether a recommendation meets the auto-approval criteria
///
/// Does not consult `auto_approval.enabled` or re-run safety checks.
pub fn can_auto_approve(
    recommendation: &LearningRecommendation,
    settings: &ParentalControlSettings,
) -> bool {
    let criteria = &settings.auto_approval.criteria;
    recommendation.estimated_duration_minutes <= criteria.max_duration_minutes
        && recommendation.skill_level <= criteria.max_difficulty
        && !settings.is_subject_restricted(&recommendation.subject)
        && !(recommendation.is_new_content && criteria.require_review_for_new_content)
}

fn urgency_priority(urgency: Urgency) -> NotificationPriority {
    match urgency {
        Urgency::Low => NotificationPriority::Medium,
        Urgency::Normal => NotificationPriority::High,
        Urgency::High => NotificationPriority::Urgent,
    }
}
