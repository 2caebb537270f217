//! Audit Log - Append-only record of safety decisions
//!
//! Decisions are kept in a per-user sequence and written through to the
//! store under `decisions/{user}/{seq}`. Approval lifecycle events (requested,
//! granted, denied, expired) are kept alongside under `events/{user}/{seq}`.
//!
//! Sequence numbers are reserved under the user's map shard, so appends for
//! one user never share a key and appends for different users do not contend.
//! A decision enters the in-memory log only once its write has landed.

use std::ops::Range;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nestguard_core::store::{collections, list_json, put_json};
use nestguard_core::{
    ApprovalStatus, AuditEntry, NestError, NestResult, SafetyDecision, SafetyViolation, Store,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

const DECISION_PREFIX: &str = "decisions/";
const EVENT_PREFIX: &str = "events/";

fn decision_key(user_id: &str, seq: usize) -> String {
    format!("{}{}/{:020}", DECISION_PREFIX, user_id, seq)
}

fn event_key(user_id: &str, seq: usize) -> String {
    format!("{}{}/{:020}", EVENT_PREFIX, user_id, seq)
}

/// Sequence number encoded in the last segment of a stored key
fn key_sequence(key: &str) -> Option<usize> {
    key.rsplit('/').next()?.parse().ok()
}

/// Receives decisions that carry a critical violation
#[async_trait]
pub trait CriticalAlertSink: Send + Sync {
    async fn on_critical_decision(&self, decision: &SafetyDecision);
}

/// Stored form of a lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserEvent {
    user_id: String,
    entry: AuditEntry,
}

/// Compliance summary for one user over a time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_decisions: usize,
    pub approved_decisions: usize,
    pub rejected_decisions: usize,
    pub approvals_required: usize,
    pub approvals_received: usize,
    /// Every violation recorded in range, oldest decision first
    pub violations: Vec<SafetyViolation>,
}

impl AuditReport {
    /// The five headline counters, in report order
    pub fn totals(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.total_decisions,
            self.approved_decisions,
            self.rejected_decisions,
            self.approvals_required,
            self.approvals_received,
        )
    }

    /// Approvals still outstanding in this range
    pub fn approvals_outstanding(&self) -> usize {
        self.approvals_required.saturating_sub(self.approvals_received)
    }
}

pub struct AuditLog {
    store: Arc<dyn Store>,
    decisions: DashMap<String, Vec<SafetyDecision>>,
    /// Store key of each persisted decision, by decision id
    decision_keys: DashMap<String, String>,
    /// Next decision sequence number per user
    next_decision: DashMap<String, usize>,
    events: DashMap<String, Vec<AuditEntry>>,
    alert_sink: RwLock<Option<Weak<dyn CriticalAlertSink>>>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            decisions: DashMap::new(),
            decision_keys: DashMap::new(),
            next_decision: DashMap::new(),
            events: DashMap::new(),
            alert_sink: RwLock::new(None),
        }
    }

    /// Route critical decisions to `sink`
    ///
    /// Held weakly: the sink usually owns this log.
    pub fn set_alert_sink(&self, sink: Weak<dyn CriticalAlertSink>) {
        *self.alert_sink.write() = Some(sink);
    }

    /// Append a decision and write it through to the store
    ///
    /// Decisions with a critical violation are handed to the alert sink
    /// before this returns, even when the write fails. A decision that could
    /// not be written is not kept in memory.
    pub async fn append(&self, decision: SafetyDecision) -> NestResult<()> {
        let key = {
            let mut next = self.next_decision.entry(decision.user_id.clone()).or_insert(0);
            let seq = *next;
            *next += 1;
            decision_key(&decision.user_id, seq)
        };

        let persisted = put_json(self.store.as_ref(), collections::AUDIT, &key, &decision).await;
        match &persisted {
            Ok(()) => {
                self.decision_keys.insert(decision.id.clone(), key);
                self.decisions
                    .entry(decision.user_id.clone())
                    .or_default()
                    .push(decision.clone());
                debug!("Appended decision {} for user {}", decision.id, decision.user_id);
            }
            Err(e) => error!("Failed to persist decision {}: {}", decision.id, e),
        }

        if decision.result.has_critical_violation() {
            let sink = self.alert_sink.read().as_ref().and_then(Weak::upgrade);
            match sink {
                Some(sink) => sink.on_critical_decision(&decision).await,
                None => warn!(
                    "Critical decision {} for user {} has no alert sink",
                    decision.id, decision.user_id
                ),
            }
        }
        persisted
    }

    /// Record the parental approval of a decision
    ///
    /// A decision's approval is recorded at most once.
    pub async fn record_approval(
        &self,
        user_id: &str,
        decision_id: &str,
        approver_id: &str,
        at: DateTime<Utc>,
    ) -> NestResult<()> {
        let key = self
            .decision_keys
            .get(decision_id)
            .map(|k| k.value().clone())
            .ok_or_else(|| NestError::not_found(format!("Decision {}", decision_id)))?;
        let (previous, updated) = {
            let mut sequence = self
                .decisions
                .get_mut(user_id)
                .ok_or_else(|| NestError::not_found(format!("No decisions for user {}", user_id)))?;
            let decision = sequence
                .iter_mut()
                .find(|d| d.id == decision_id)
                .ok_or_else(|| NestError::not_found(format!("Decision {}", decision_id)))?;
            let previous = decision.clone();
            if !decision.record_approval(approver_id, at) {
                return Err(NestError::InvalidState {
                    request_id: decision_id.to_string(),
                    status: ApprovalStatus::Approved,
                });
            }
            (previous, decision.clone())
        };

        if let Err(e) = put_json(self.store.as_ref(), collections::AUDIT, &key, &updated).await {
            error!("Failed to persist approval of decision {}: {}", decision_id, e);
            if let Some(mut sequence) = self.decisions.get_mut(user_id) {
                if let Some(decision) = sequence.iter_mut().find(|d| d.id == decision_id) {
                    *decision = previous;
                }
            }
            return Err(e);
        }
        info!("Recorded approval of decision {} by {}", decision_id, approver_id);
        Ok(())
    }

    /// Append a lifecycle event for a user
    pub async fn record_event(&self, user_id: &str, entry: AuditEntry) -> NestResult<()> {
        let key = {
            let mut sequence = self.events.entry(user_id.to_string()).or_default();
            sequence.push(entry.clone());
            event_key(user_id, sequence.len() - 1)
        };
        let stored = UserEvent {
            user_id: user_id.to_string(),
            entry,
        };
        put_json(self.store.as_ref(), collections::AUDIT, &key, &stored).await
    }

    /// Every decision for a user, in append order
    pub fn decisions_for(&self, user_id: &str) -> Vec<SafetyDecision> {
        self.decisions
            .get(user_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn get_decision(&self, user_id: &str, decision_id: &str) -> Option<SafetyDecision> {
        self.decisions
            .get(user_id)
            .and_then(|s| s.iter().find(|d| d.id == decision_id).cloned())
    }

    /// Every lifecycle event for a user, in append order
    pub fn events_for(&self, user_id: &str) -> Vec<AuditEntry> {
        self.events.get(user_id).map(|s| s.clone()).unwrap_or_default()
    }

    /// Users with at least one recorded decision
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.decisions.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Summarize a user's decisions with timestamps in `range`
    pub fn generate_report(&self, user_id: &str, range: Range<DateTime<Utc>>) -> AuditReport {
        let mut report = AuditReport {
            user_id: user_id.to_string(),
            start: range.start,
            end: range.end,
            total_decisions: 0,
            approved_decisions: 0,
            rejected_decisions: 0,
            approvals_required: 0,
            approvals_received: 0,
            violations: Vec::new(),
        };

        let Some(sequence) = self.decisions.get(user_id) else {
            return report;
        };
        for decision in sequence.iter().filter(|d| range.contains(&d.timestamp)) {
            report.total_decisions += 1;
            if decision.result.approved {
                report.approved_decisions += 1;
            } else {
                report.rejected_decisions += 1;
            }
            if decision.requires_approval {
                report.approvals_required += 1;
            }
            if decision.approval_received {
                report.approvals_received += 1;
            }
            report.violations.extend(decision.result.violations.iter().cloned());
        }
        report
    }

    /// Reload decisions and events from the store
    ///
    /// Replaces in-memory state. Returns the number of decisions loaded.
    pub async fn recover(&self) -> NestResult<usize> {
        let entries = self
            .store
            .list(collections::AUDIT, Some(DECISION_PREFIX))
            .await?;
        let events: Vec<UserEvent> =
            list_json(self.store.as_ref(), collections::AUDIT, Some(EVENT_PREFIX)).await?;

        self.decisions.clear();
        self.decision_keys.clear();
        self.next_decision.clear();
        self.events.clear();

        let mut count = 0;
        for entry in entries {
            let decision: SafetyDecision = match serde_json::from_value(entry.value) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!("Skipping unreadable decision {}: {}", entry.key, e);
                    continue;
                }
            };
            if let Some(seq) = key_sequence(&entry.key) {
                let mut next = self.next_decision.entry(decision.user_id.clone()).or_insert(0);
                *next = (*next).max(seq + 1);
            }
            self.decision_keys.insert(decision.id.clone(), entry.key);
            self.decisions
                .entry(decision.user_id.clone())
                .or_default()
                .push(decision);
            count += 1;
        }
        for event in events {
            self.events.entry(event.user_id).or_default().push(event.entry);
        }

        info!("Recovered {} audit decisions", count);
        Ok(count)
    }
}
