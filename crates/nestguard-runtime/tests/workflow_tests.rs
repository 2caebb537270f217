//! Integration tests for the parental approval workflow
//!
//! Covers:
//! - Rejection of already-expired requests
//! - Auto-approval on creation
//! - Pending requests, parental decisions and authorization
//! - Expiration through the scheduler tick
//! - Exactly one winner when a decision races an expiration
//! - Recovery of pending requests from the store
//! - Linking approvals back to the audited safety decision

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use nestguard_core::{
    AdaptationType, ApprovalStatus, AuditAction, AuditEntry, ChannelKind,
    ChildLearningProfileStore, Clock, DecisionType, LearningAdaptation, LearningRecommendation,
    ManualClock, NestError, NestResult, NotificationChannel, NotificationType,
    ParentalApprovalRequest, ParentalControlSettings, ParentalNotification, SafetyDecision,
    SafetyValidationResult, SkillLevel, Store, StoreEntry,
};
use nestguard_core::store::collections;
use nestguard_memory::InMemoryStore;
use nestguard_runtime::{
    ApprovalRepository, ApprovalWorkflow, AuditLog, NotificationScheduler, SettingsRepository,
};
use parking_lot::Mutex;

// ============================================================================
// TEST DOUBLES
// ============================================================================

struct RecordingChannel {
    delivered: Mutex<Vec<ParentalNotification>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn deliver(&self, notification: &ParentalNotification) -> NestResult<()> {
        self.delivered.lock().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingLearningStore {
    applied: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

#[async_trait]
impl ChildLearningProfileStore for RecordingLearningStore {
    async fn apply_approved_adaptation(
        &self,
        child_id: &str,
        adaptation: &LearningAdaptation,
    ) -> NestResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NestError::collaborator("learning profile offline"));
        }
        self.applied
            .lock()
            .push((child_id.to_string(), adaptation.id.clone()));
        Ok(())
    }
}

/// In-memory store whose approval request writes fail while `failing` is set
#[derive(Default)]
struct FlakyRequestStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

#[async_trait]
impl Store for FlakyRequestStore {
    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> NestResult<()> {
        if collection == collections::APPROVAL_REQUESTS && self.failing.load(Ordering::SeqCst) {
            return Err(NestError::store("request volume unavailable"));
        }
        self.inner.put(collection, key, value).await
    }

    async fn get(&self, collection: &str, key: &str) -> NestResult<Option<serde_json::Value>> {
        self.inner.get(collection, key).await
    }

    async fn delete(&self, collection: &str, key: &str) -> NestResult<()> {
        self.inner.delete(collection, key).await
    }

    async fn list(&self, collection: &str, prefix: Option<&str>) -> NestResult<Vec<StoreEntry>> {
        self.inner.list(collection, prefix).await
    }
}

/// Push gateway that never answers
struct StalledPush;

#[async_trait]
impl NotificationChannel for StalledPush {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn deliver(&self, _notification: &ParentalNotification) -> NestResult<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<dyn Store>,
    settings: SettingsRepository,
    audit: Arc<AuditLog>,
    notifier: Arc<NotificationScheduler>,
    workflow: Arc<ApprovalWorkflow>,
    push: Arc<RecordingChannel>,
    learning: Arc<RecordingLearningStore>,
}

fn harness_with_store(store: Arc<dyn Store>) -> Harness {
    harness_with_channels(store, Vec::new())
}

/// Harness whose extra channels replace the recording push channel by kind
fn harness_with_channels(
    store: Arc<dyn Store>,
    channels: Vec<Arc<dyn NotificationChannel>>,
) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let settings = SettingsRepository::new(store.clone(), clock.clone());
    let audit = Arc::new(AuditLog::new(store.clone()));
    let push = Arc::new(RecordingChannel {
        delivered: Mutex::new(Vec::new()),
    });
    let mut scheduler =
        NotificationScheduler::new(store.clone(), settings.clone(), audit.clone(), clock.clone());
    scheduler.register_channel(push.clone());
    for channel in channels {
        scheduler.register_channel(channel);
    }
    let notifier = Arc::new(scheduler.with_delivery_timeout(std::time::Duration::from_secs(2)));
    let learning = Arc::new(RecordingLearningStore::default());
    let workflow = Arc::new(ApprovalWorkflow::new(
        ApprovalRepository::new(store.clone()),
        settings.clone(),
        audit.clone(),
        notifier.clone(),
        learning.clone(),
        clock.clone(),
    ));

    Harness {
        clock,
        store,
        settings,
        audit,
        notifier,
        workflow,
        push,
        learning,
    }
}

fn harness() -> Harness {
    harness_with_store(Arc::new(InMemoryStore::new()))
}

fn recommendation(subject: &str, minutes: u32, level: SkillLevel) -> LearningRecommendation {
    LearningRecommendation {
        id: "rec-1".to_string(),
        title: "Gentler answers".to_string(),
        subject: subject.to_string(),
        skill_level: level,
        estimated_duration_minutes: minutes,
        is_new_content: false,
        adaptation: LearningAdaptation::new("adapt-1", "teen", AdaptationType::ResponseStyle, 0.95),
    }
}

impl Harness {
    fn request(&self, ttl: Duration) -> ParentalApprovalRequest {
        ParentalApprovalRequest::new(
            "teen",
            "mom",
            recommendation("reading", 20, SkillLevel::Beginner),
            self.clock.now(),
            ttl,
        )
    }

    async fn manual_settings(&self) -> ParentalControlSettings {
        self.settings.get_or_default("mom", "teen").await.unwrap()
    }

    async fn auto_settings(&self) -> ParentalControlSettings {
        let mut settings = self.manual_settings().await;
        settings.auto_approval.enabled = true;
        self.settings.update(settings).await.unwrap()
    }
}

// ============================================================================
// CREATION
// ============================================================================

#[tokio::test]
async fn test_expired_request_is_rejected_and_not_stored() {
    let h = harness();
    let settings = h.manual_settings().await;
    let request = ParentalApprovalRequest::new(
        "teen",
        "mom",
        recommendation("reading", 20, SkillLevel::Beginner),
        h.clock.now() - Duration::hours(2),
        Duration::hours(1),
    );
    let id = request.id.clone();

    let result = h.workflow.create(request, &settings).await;
    assert!(matches!(result, Err(NestError::ExpiredRequest { .. })));
    assert!(h.workflow.get(&id).is_none());
    assert!(h.workflow.list_pending_for_parent("mom").is_empty());
    assert!(ApprovalRepository::new(h.store.clone()).get(&id).await.unwrap().is_none());
    assert_eq!(h.workflow.scheduled_expirations(), 0);
}

#[tokio::test]
async fn test_auto_approval_applies_immediately() {
    let h = harness();
    let settings = h.auto_settings().await;

    let created = h.workflow.create(h.request(Duration::hours(12)), &settings).await.unwrap();

    assert_eq!(created.status, ApprovalStatus::AutoApproved);
    assert_eq!(created.approver_id.as_deref(), Some("mom"));
    assert!(created
        .auto_approval_reason
        .as_deref()
        .unwrap_or_default()
        .contains("Auto-approved"));
    assert_eq!(
        *h.learning.applied.lock(),
        vec![("teen".to_string(), "adapt-1".to_string())]
    );
    assert_eq!(h.workflow.adaptations_applied_today("teen"), 1);
    assert!(h.workflow.list_pending_for_parent("mom").is_empty());
    assert_eq!(h.workflow.scheduled_expirations(), 0);

    // Low priority: held for the digest, still in the inbox
    assert!(h.push.delivered.lock().is_empty());
    let held = h.notifier.pending_digest("mom", "teen");
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].notification_type, NotificationType::AutoApproved);
    assert_eq!(h.notifier.inbox().list_for_parent("mom").len(), 1);

    let events = h.audit.events_for("teen");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::ApprovalGranted);
}

#[tokio::test]
async fn test_criteria_miss_leaves_request_pending() {
    let h = harness();
    let settings = h.auto_settings().await;
    let request = ParentalApprovalRequest::new(
        "teen",
        "mom",
        recommendation("reading", 90, SkillLevel::Beginner),
        h.clock.now(),
        Duration::hours(12),
    );

    let created = h.workflow.create(request, &settings).await.unwrap();
    assert_eq!(created.status, ApprovalStatus::Pending);
    assert!(h.learning.applied.lock().is_empty());
}

#[tokio::test]
async fn test_pending_request_notifies_parent() {
    let h = harness();
    let settings = h.manual_settings().await;

    let created = h.workflow.create(h.request(Duration::hours(12)), &settings).await.unwrap();

    assert_eq!(created.status, ApprovalStatus::Pending);
    assert_eq!(h.workflow.list_pending_for_parent("mom").len(), 1);
    assert_eq!(h.workflow.list_for_child("teen").len(), 1);
    assert_eq!(h.workflow.scheduled_expirations(), 1);
    assert_eq!(h.workflow.next_expiration(), Some(created.expires_at));

    let delivered = h.push.delivered.lock().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].notification_type, NotificationType::ApprovalRequired);
    assert!(delivered[0].action_required);
    assert_eq!(delivered[0].request_id.as_deref(), Some(created.id.as_str()));

    assert_eq!(h.audit.events_for("teen")[0].action, AuditAction::ApprovalRequested);
}

#[tokio::test]
async fn test_settings_for_another_pair_rejected() {
    let h = harness();
    let settings = h.settings.get_or_default("dad", "teen").await.unwrap();
    let result = h.workflow.create(h.request(Duration::hours(1)), &settings).await;
    assert!(matches!(result, Err(NestError::Validation(_))));
}

// ============================================================================
// DECISIONS
// ============================================================================

#[tokio::test]
async fn test_parent_approves_pending_request() {
    let h = harness();
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(12)), &settings).await.unwrap();

    let decided = h
        .workflow
        .decide(&created.id, "mom", true, Some("Fine for weekends".to_string()))
        .await
        .unwrap();

    assert_eq!(decided.status, ApprovalStatus::Approved);
    assert_eq!(decided.parent_notes.as_deref(), Some("Fine for weekends"));
    assert_eq!(decided.decided_at, Some(h.clock.now()));
    assert_eq!(h.learning.applied.lock().len(), 1);
    assert!(h.workflow.list_pending_for_parent("mom").is_empty());

    let actions: Vec<_> = h.audit.events_for("teen").iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::ApprovalRequested, AuditAction::ApprovalGranted]);

    let again = h.workflow.decide(&created.id, "mom", false, None).await;
    assert!(matches!(
        again,
        Err(NestError::InvalidState {
            status: ApprovalStatus::Approved,
            ..
        })
    ));

    let stored = ApprovalRepository::new(h.store.clone())
        .get(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn test_rejection_does_not_apply() {
    let h = harness();
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(12)), &settings).await.unwrap();

    let decided = h.workflow.decide(&created.id, "mom", false, None).await.unwrap();
    assert_eq!(decided.status, ApprovalStatus::Rejected);
    assert!(h.learning.applied.lock().is_empty());
    assert_eq!(h.audit.events_for("teen")[1].action, AuditAction::ApprovalDenied);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_channel_does_not_block_decisions() {
    let h = harness_with_channels(Arc::new(InMemoryStore::new()), vec![Arc::new(StalledPush)]);
    let settings = h.manual_settings().await;

    let created = h.workflow.create(h.request(Duration::hours(1)), &settings).await.unwrap();
    let decided = h.workflow.decide(&created.id, "mom", true, None).await.unwrap();

    assert_eq!(decided.status, ApprovalStatus::Approved);
    assert_eq!(h.learning.applied.lock().len(), 1);
    assert!(h.push.delivered.lock().is_empty());
    assert_eq!(h.notifier.inbox().list_for_parent("mom").len(), 2);
}

#[tokio::test]
async fn test_only_the_requests_parent_may_decide() {
    let h = harness();
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(12)), &settings).await.unwrap();

    let result = h.workflow.decide(&created.id, "neighbor", true, None).await;
    assert!(matches!(result, Err(NestError::Authorization { .. })));
    assert_eq!(h.workflow.get(&created.id).unwrap().status, ApprovalStatus::Pending);
    assert!(h.learning.applied.lock().is_empty());
}

#[tokio::test]
async fn test_unknown_request() {
    let h = harness();
    let result = h.workflow.decide("missing", "mom", true, None).await;
    assert!(matches!(result, Err(NestError::NotFound(_))));
    assert!(!h.workflow.expire("missing").await.unwrap());
}

#[tokio::test]
async fn test_failed_apply_keeps_approval() {
    let h = harness();
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(12)), &settings).await.unwrap();
    h.learning.failing.store(true, Ordering::SeqCst);

    let decided = h.workflow.decide(&created.id, "mom", true, None).await.unwrap();
    assert_eq!(decided.status, ApprovalStatus::Approved);
    assert_eq!(h.workflow.adaptations_applied_today("teen"), 0);
}

#[tokio::test]
async fn test_approval_marks_linked_decision() {
    let h = harness();
    let settings = h.manual_settings().await;
    let result = SafetyValidationResult::from_violations(
        vec![],
        vec![],
        true,
        AuditEntry::new(AuditAction::Approved, "test", "needs approval"),
    );
    let decision = SafetyDecision::new(
        "teen",
        DecisionType::AdaptationValidation,
        "adapt-1",
        result,
        h.clock.now(),
    );
    let decision_id = decision.id.clone();
    h.audit.append(decision).await.unwrap();

    let request = h.request(Duration::hours(12)).with_decision(decision_id.clone());
    let created = h.workflow.create(request, &settings).await.unwrap();
    h.workflow.decide(&created.id, "mom", true, None).await.unwrap();

    let stored = h.audit.get_decision("teen", &decision_id).unwrap();
    assert!(stored.approval_received);
    assert_eq!(stored.approver_id.as_deref(), Some("mom"));

    let now = h.clock.now();
    let report = h
        .audit
        .generate_report("teen", now - Duration::hours(1)..now + Duration::hours(1));
    assert_eq!(report.totals(), (1, 1, 0, 1, 1));
}

#[tokio::test]
async fn test_unpersisted_decision_leaves_request_pending() {
    let store = Arc::new(FlakyRequestStore::default());
    let h = harness_with_store(store.clone());
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(1)), &settings).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let failed = h.workflow.decide(&created.id, "mom", true, None).await;
    assert!(matches!(failed, Err(NestError::Store(_))));
    let current = h.workflow.get(&created.id).unwrap();
    assert_eq!(current.status, ApprovalStatus::Pending);
    assert_eq!(current.approver_id, None);
    assert!(h.learning.applied.lock().is_empty());

    // The stored copy is still pending, so a restart agrees with memory
    let restarted = harness_with_store(store.clone());
    assert_eq!(restarted.workflow.recover().await.unwrap(), 1);

    store.failing.store(false, Ordering::SeqCst);
    let decided = h.workflow.decide(&created.id, "mom", true, None).await.unwrap();
    assert_eq!(decided.status, ApprovalStatus::Approved);
    assert_eq!(h.learning.applied.lock().len(), 1);

    let restarted = harness_with_store(store);
    assert_eq!(restarted.workflow.recover().await.unwrap(), 0);
    assert_eq!(
        restarted.workflow.get(&created.id).unwrap().status,
        ApprovalStatus::Approved
    );
}

// ============================================================================
// EXPIRATION
// ============================================================================

#[tokio::test]
async fn test_expiration_tick() {
    let h = harness();
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(1)), &settings).await.unwrap();

    assert!(!h.workflow.expire(&created.id).await.unwrap());
    assert_eq!(h.workflow.process_due_expirations().await, 0);

    h.clock.advance(Duration::hours(1));
    assert_eq!(h.workflow.process_due_expirations().await, 1);
    assert_eq!(h.workflow.get(&created.id).unwrap().status, ApprovalStatus::Expired);
    assert_eq!(h.workflow.scheduled_expirations(), 0);

    let late = h.workflow.decide(&created.id, "mom", true, None).await;
    assert!(matches!(
        late,
        Err(NestError::InvalidState {
            status: ApprovalStatus::Expired,
            ..
        })
    ));
    assert!(h.learning.applied.lock().is_empty());

    let inbox = h.notifier.inbox().list_for_parent("mom");
    assert!(inbox
        .iter()
        .any(|n| n.notification_type == NotificationType::RequestExpired));
    assert_eq!(
        h.audit.events_for("teen").last().map(|e| e.action),
        Some(AuditAction::ApprovalExpired)
    );
}

#[tokio::test]
async fn test_unpersisted_expiration_is_retried() {
    let store = Arc::new(FlakyRequestStore::default());
    let h = harness_with_store(store.clone());
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(1)), &settings).await.unwrap();

    h.clock.advance(Duration::hours(2));
    store.failing.store(true, Ordering::SeqCst);
    assert_eq!(h.workflow.process_due_expirations().await, 0);
    assert_eq!(h.workflow.get(&created.id).unwrap().status, ApprovalStatus::Pending);
    assert_eq!(h.workflow.scheduled_expirations(), 1);

    store.failing.store(false, Ordering::SeqCst);
    assert_eq!(h.workflow.process_due_expirations().await, 1);
    assert_eq!(h.workflow.get(&created.id).unwrap().status, ApprovalStatus::Expired);
}

#[tokio::test]
async fn test_decided_requests_pruned_after_retention() {
    let h = harness();
    let settings = h.manual_settings().await;
    let decided = h.workflow.create(h.request(Duration::hours(1)), &settings).await.unwrap();
    let waiting = h.workflow.create(h.request(Duration::days(30)), &settings).await.unwrap();
    h.workflow.decide(&decided.id, "mom", true, None).await.unwrap();

    assert_eq!(h.workflow.prune(), 0);
    h.clock.advance(Duration::days(8));
    assert_eq!(h.workflow.prune(), 1);

    assert!(h.workflow.get(&decided.id).is_none());
    assert_eq!(h.workflow.get(&waiting.id).unwrap().status, ApprovalStatus::Pending);
    let stored = ApprovalRepository::new(h.store.clone())
        .get(&decided.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ApprovalStatus::Approved);
    assert_eq!(h.workflow.adaptations_applied_today("teen"), 0);
}

#[tokio::test]
async fn test_decided_request_ignores_expiration() {
    let h = harness();
    let settings = h.manual_settings().await;
    let created = h.workflow.create(h.request(Duration::hours(1)), &settings).await.unwrap();
    h.workflow.decide(&created.id, "mom", false, None).await.unwrap();

    h.clock.advance(Duration::hours(2));
    assert_eq!(h.workflow.process_due_expirations().await, 0);
    assert_eq!(h.workflow.get(&created.id).unwrap().status, ApprovalStatus::Rejected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_decide_racing_expire_has_one_winner() {
    let h = harness();
    let settings = h.manual_settings().await;

    let mut ids = Vec::new();
    for _ in 0..32 {
        let created = h.workflow.create(h.request(Duration::minutes(5)), &settings).await.unwrap();
        ids.push(created.id);
    }
    h.clock.advance(Duration::minutes(5));

    let mut races = Vec::new();
    for id in &ids {
        let decider = h.workflow.clone();
        let expirer = h.workflow.clone();
        let (decide_id, expire_id) = (id.clone(), id.clone());
        races.push(tokio::spawn(async move {
            let decide =
                tokio::spawn(async move { decider.decide(&decide_id, "mom", true, None).await });
            let expire = tokio::spawn(async move { expirer.expire(&expire_id).await });
            (decide.await.unwrap(), expire.await.unwrap())
        }));
    }

    for (race, id) in races.into_iter().zip(&ids) {
        let (decided, expired) = race.await.unwrap();
        let expired = expired.unwrap();
        match decided {
            Ok(request) => {
                assert!(!expired);
                assert_eq!(request.status, ApprovalStatus::Approved);
            }
            Err(NestError::InvalidState { status, .. }) => {
                assert!(expired);
                assert_eq!(status, ApprovalStatus::Expired);
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
        assert!(h.workflow.get(id).unwrap().status.is_terminal());
    }

    let approved = ids
        .iter()
        .filter(|id| h.workflow.get(id).unwrap().status == ApprovalStatus::Approved)
        .count();
    assert_eq!(h.learning.applied.lock().len(), approved);
}

// ============================================================================
// RECOVERY
// ============================================================================

#[tokio::test]
async fn test_recover_pending_requests() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let first = harness_with_store(store.clone());
    let settings = first.manual_settings().await;
    let pending = first
        .workflow
        .create(first.request(Duration::hours(1)), &settings)
        .await
        .unwrap();
    let decided = first
        .workflow
        .create(first.request(Duration::hours(1)), &settings)
        .await
        .unwrap();
    first.workflow.decide(&decided.id, "mom", true, None).await.unwrap();

    let second = harness_with_store(store);
    assert_eq!(second.workflow.recover().await.unwrap(), 1);
    assert_eq!(second.workflow.list_for_child("teen").len(), 2);
    let listed = second.workflow.list_pending_for_parent("mom");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, pending.id);
    assert_eq!(second.workflow.scheduled_expirations(), 1);

    second.clock.advance(Duration::hours(1));
    assert_eq!(second.workflow.process_due_expirations().await, 1);
}
