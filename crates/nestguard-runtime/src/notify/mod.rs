//! Notification Scheduler - Deliver parental notifications
//!
//! Delivery rules:
//! - High and urgent notifications go out immediately on every configured
//!   channel, unless the parent is inside quiet hours
//! - High and urgent notifications sent during quiet hours are held and go
//!   out once quiet hours end
//! - Everything else waits for the next digest, or stays in the inbox only
//!   when the parent has no digest enabled
//! - Critical safety alerts ignore quiet hours
//! - Every notification lands in the parent's inbox either way
//!
//! Channel failures are logged and never surface to the caller. Each delivery
//! is bounded by the delivery timeout, so a stalled channel cannot hold up a
//! decision.

mod channel;
mod inbox;

pub use channel::TracingChannel;
pub use inbox::NotificationInbox;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use nestguard_core::settings::settings_key;
use nestguard_core::{
    ChannelKind, Clock, NestResult, NotificationChannel, NotificationPriority, NotificationType,
    ParentalControlSettings, ParentalNotification, SafetyDecision, Store,
};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditLog, AuditReport, CriticalAlertSink};
use crate::repository::SettingsRepository;

/// Digest cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestPeriod {
    Daily,
    Weekly,
}

impl DigestPeriod {
    /// Window the digest report covers, ending now
    pub fn lookback(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
        }
    }

    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::Daily => NotificationType::DailySummary,
            Self::Weekly => NotificationType::WeeklySummary,
        }
    }

    fn enabled_for(&self, settings: &ParentalControlSettings) -> bool {
        match self {
            Self::Daily => settings.notifications.daily_digest,
            Self::Weekly => settings.notifications.weekly_digest,
        }
    }
}

impl std::fmt::Display for DigestPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

/// What happened to a sent notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to channels; `delivered` of them accepted it
    Immediate { delivered: usize },
    /// Held for the next digest
    Deferred,
}

/// Default bound on one channel delivery
pub const DEFAULT_DELIVERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct NotificationScheduler {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    delivery_timeout: std::time::Duration,
    inbox: NotificationInbox,
    /// Digest items keyed by (parent, child)
    deferred: DashMap<String, Vec<ParentalNotification>>,
    /// Immediate notifications held only by quiet hours, keyed by (parent, child)
    quiet_held: DashMap<String, Vec<ParentalNotification>>,
    settings: SettingsRepository,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        settings: SettingsRepository,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            channels: HashMap::new(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            inbox: NotificationInbox::new(store),
            deferred: DashMap::new(),
            quiet_held: DashMap::new(),
            settings,
            audit,
            clock,
        }
    }

    /// Register a delivery channel, replacing any channel of the same kind
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        let kind = channel.kind();
        info!("Registered {} notification channel", kind);
        self.channels.insert(kind, channel);
    }

    pub fn with_delivery_timeout(mut self, delivery_timeout: std::time::Duration) -> Self {
        self.delivery_timeout = delivery_timeout;
        self
    }

    /// Register a tracing channel for every kind without a channel
    pub fn with_tracing_channels(mut self) -> Self {
        for kind in [
            ChannelKind::Voice,
            ChannelKind::Visual,
            ChannelKind::Email,
            ChannelKind::Push,
        ] {
            self.channels
                .entry(kind)
                .or_insert_with(|| Arc::new(TracingChannel::new(kind)));
        }
        self
    }

    pub fn inbox(&self) -> &NotificationInbox {
        &self.inbox
    }

    /// Notifications held for the next digest of a (parent, child) pair
    pub fn pending_digest(&self, parent_id: &str, child_id: &str) -> Vec<ParentalNotification> {
        self.deferred
            .get(&settings_key(parent_id, child_id))
            .map(|held| held.value().clone())
            .unwrap_or_default()
    }

    /// High and urgent notifications waiting for a pair's quiet hours to end
    pub fn held_for_quiet_hours(
        &self,
        parent_id: &str,
        child_id: &str,
    ) -> Vec<ParentalNotification> {
        self.quiet_held
            .get(&settings_key(parent_id, child_id))
            .map(|held| held.value().clone())
            .unwrap_or_default()
    }

    /// Send a notification under the parent's preferences
    pub async fn send(
        &self,
        notification: ParentalNotification,
        settings: &ParentalControlSettings,
    ) -> Dispatch {
        let now = self.clock.now();
        let quiet = settings.notifications.in_quiet_hours(now);

        if !quiet {
            self.release_held(settings).await;
        }

        let key = settings_key(&notification.parent_id, &notification.child_id);
        let dispatch = if notification.priority.is_immediate() {
            if quiet {
                debug!(
                    "Holding {:?} notification {} for parent {} until quiet hours end",
                    notification.priority, notification.id, notification.parent_id
                );
                self.quiet_held.entry(key).or_default().push(notification.clone());
                Dispatch::Deferred
            } else {
                let delivered = self
                    .dispatch(&notification, &settings.notifications.channels)
                    .await;
                Dispatch::Immediate { delivered }
            }
        } else {
            if settings.notifications.any_digest() {
                debug!(
                    "Deferring {:?} notification {} for parent {} to the digest",
                    notification.priority, notification.id, notification.parent_id
                );
                self.deferred.entry(key).or_default().push(notification.clone());
            }
            Dispatch::Deferred
        };

        self.store_in_inbox(notification).await;
        dispatch
    }

    /// Alert every parent of the child immediately, ignoring quiet hours
    ///
    /// The notification's `parent_id` is replaced per parent. Returns the
    /// number of parents alerted.
    pub async fn send_critical_alert(&self, notification: ParentalNotification) -> usize {
        let parents = match self.settings.list_for_child(&notification.child_id).await {
            Ok(parents) => parents,
            Err(e) => {
                error!(
                    "Failed to resolve parents of child {} for critical alert: {}",
                    notification.child_id, e
                );
                return 0;
            }
        };
        if parents.is_empty() {
            warn!(
                "Critical alert for child {} has no configured parents",
                notification.child_id
            );
            return 0;
        }

        for settings in &parents {
            let mut alert = notification.clone();
            alert.id = uuid::Uuid::new_v4().to_string();
            alert.parent_id = settings.parent_id.clone();
            alert.priority = NotificationPriority::Urgent;

            let delivered = self.dispatch(&alert, &settings.notifications.channels).await;
            info!(
                "Critical alert for child {} sent to parent {} on {} channels",
                alert.child_id, alert.parent_id, delivered
            );
            self.store_in_inbox(alert).await;
        }
        parents.len()
    }

    /// Compile and send the digest for every pair with this period enabled
    ///
    /// Returns the summaries sent.
    pub async fn run_digest(
        &self,
        period: DigestPeriod,
        now: DateTime<Utc>,
    ) -> NestResult<Vec<ParentalNotification>> {
        let mut summaries = Vec::new();

        for settings in self.settings.list_all().await? {
            if !period.enabled_for(&settings) {
                if !settings.notifications.any_digest()
                    && self.deferred.remove(&settings.key()).is_some()
                {
                    debug!("Dropped digest items for {}; no digest is enabled", settings.key());
                }
                continue;
            }

            let report = self
                .audit
                .generate_report(&settings.child_id, now - period.lookback()..now);
            let held = self
                .deferred
                .remove(&settings.key())
                .map(|(_, held)| held)
                .unwrap_or_default();

            let summary = ParentalNotification::new(
                settings.parent_id.clone(),
                settings.child_id.clone(),
                period.notification_type(),
                NotificationPriority::Low,
                format!("{} summary for {}", capitalize(&period.to_string()), settings.child_id),
                digest_message(&report, &held),
            )
            .at(now);

            self.dispatch(&summary, &settings.notifications.channels).await;
            self.store_in_inbox(summary.clone()).await;
            summaries.push(summary);
        }

        info!("Sent {} {} digests", summaries.len(), period);
        Ok(summaries)
    }

    /// Send what quiet hours held for every pair whose quiet hours have ended
    ///
    /// Returns the number of notifications released.
    pub async fn release_quiet_hours(&self) -> NestResult<usize> {
        if self.quiet_held.is_empty() {
            return Ok(0);
        }
        let now = self.clock.now();
        let mut released = 0;
        for settings in self.settings.list_all().await? {
            if self.quiet_held.contains_key(&settings.key())
                && !settings.notifications.in_quiet_hours(now)
            {
                released += self.release_held(&settings).await;
            }
        }
        Ok(released)
    }

    /// Run `release_quiet_hours` every `tick`
    pub fn spawn_quiet_hours_release(self: Arc<Self>, tick: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                if let Err(e) = self.release_quiet_hours().await {
                    warn!("Quiet hours release failed: {}", e);
                }
            }
        })
    }

    /// Run daily and weekly digests on fixed intervals
    ///
    /// The first run happens one full interval after spawning.
    pub fn spawn_digest_jobs(
        self: Arc<Self>,
        daily_every: std::time::Duration,
        weekly_every: std::time::Duration,
    ) -> Vec<JoinHandle<()>> {
        [(DigestPeriod::Daily, daily_every), (DigestPeriod::Weekly, weekly_every)]
            .into_iter()
            .map(|(period, every)| {
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(every);
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        let now = scheduler.clock.now();
                        if let Err(e) = scheduler.run_digest(period, now).await {
                            warn!("{} digest run failed: {}", period, e);
                        }
                    }
                })
            })
            .collect()
    }

    /// Deliver on the given channel kinds concurrently; returns successes
    async fn dispatch(&self, notification: &ParentalNotification, kinds: &[ChannelKind]) -> usize {
        let mut deliveries = Vec::new();
        for kind in kinds {
            match self.channels.get(kind) {
                Some(channel) => deliveries.push(async move {
                    (*kind, timeout(self.delivery_timeout, channel.deliver(notification)).await)
                }),
                None => warn!("No {} channel registered, skipping", kind),
            }
        }

        let mut delivered = 0;
        for (kind, result) in join_all(deliveries).await {
            match result {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(
                    "Failed to deliver notification {} on {}: {}",
                    notification.id, kind, e
                ),
                Err(_) => warn!(
                    "Delivery of notification {} on {} timed out after {:?}",
                    notification.id, kind, self.delivery_timeout
                ),
            }
        }
        delivered
    }

    async fn release_held(&self, settings: &ParentalControlSettings) -> usize {
        let Some((_, held)) = self.quiet_held.remove(&settings.key()) else {
            return 0;
        };
        for notification in &held {
            self.dispatch(notification, &settings.notifications.channels).await;
        }
        info!(
            "Released {} notifications held by quiet hours for {}",
            held.len(),
            settings.key()
        );
        held.len()
    }

    async fn store_in_inbox(&self, notification: ParentalNotification) {
        let id = notification.id.clone();
        if let Err(e) = self.inbox.add(notification).await {
            warn!("Failed to store notification {} in inbox: {}", id, e);
        }
    }
}

#[async_trait]
impl CriticalAlertSink for NotificationScheduler {
    async fn on_critical_decision(&self, decision: &SafetyDecision) {
        let details: Vec<&str> = decision
            .result
            .violations
            .iter()
            .filter(|v| v.is_critical())
            .map(|v| v.description.as_str())
            .collect();
        let alert = ParentalNotification::new(
            String::new(),
            decision.user_id.clone(),
            NotificationType::SafetyAlert,
            NotificationPriority::Urgent,
            "Critical safety violation",
            format!(
                "A {} for {} was blocked: {}",
                match decision.decision_type {
                    nestguard_core::DecisionType::ContentValidation => "piece of content",
                    nestguard_core::DecisionType::AdaptationValidation => "proposed adaptation",
                },
                decision.user_id,
                details.join("; ")
            ),
        )
        .action_required()
        .at(self.clock.now());

        self.send_critical_alert(alert).await;
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn digest_message(report: &AuditReport, held: &[ParentalNotification]) -> String {
    let mut message = format!(
        "{} safety decisions ({} approved, {} rejected). {} needed your approval, {} approved. {} violations recorded.",
        report.total_decisions,
        report.approved_decisions,
        report.rejected_decisions,
        report.approvals_required,
        report.approvals_received,
        report.violations.len()
    );
    if !held.is_empty() {
        message.push_str(&format!("\n\n{} held notifications:", held.len()));
        for notification in held {
            message.push_str(&format!("\n- {}", notification.title));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_lookback() {
        assert_eq!(DigestPeriod::Daily.lookback(), Duration::days(1));
        assert_eq!(DigestPeriod::Weekly.lookback(), Duration::days(7));
        assert_eq!(DigestPeriod::Weekly.notification_type(), NotificationType::WeeklySummary);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("daily"), "Daily");
        assert_eq!(capitalize(""), "");
    }
}
