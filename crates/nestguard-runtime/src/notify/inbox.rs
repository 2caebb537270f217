//! Per-parent notification inbox

use std::sync::Arc;

use dashmap::DashMap;
use nestguard_core::store::{collections, list_json, put_json};
use nestguard_core::{NestError, NestResult, ParentalNotification, Store};
use tracing::info;

fn inbox_key(notification: &ParentalNotification) -> String {
    format!("{}/{}", notification.parent_id, notification.id)
}

/// Every notification a parent has been sent, dispatched or not
pub struct NotificationInbox {
    store: Arc<dyn Store>,
    by_parent: DashMap<String, Vec<ParentalNotification>>,
}

impl NotificationInbox {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            by_parent: DashMap::new(),
        }
    }

    pub async fn add(&self, notification: ParentalNotification) -> NestResult<()> {
        let key = inbox_key(&notification);
        put_json(self.store.as_ref(), collections::NOTIFICATIONS, &key, &notification).await?;
        self.by_parent
            .entry(notification.parent_id.clone())
            .or_default()
            .push(notification);
        Ok(())
    }

    /// A parent's notifications, oldest first
    pub fn list_for_parent(&self, parent_id: &str) -> Vec<ParentalNotification> {
        let mut list = self
            .by_parent
            .get(parent_id)
            .map(|l| l.clone())
            .unwrap_or_default();
        list.sort_by_key(|n| n.created_at);
        list
    }

    pub fn unread_count(&self, parent_id: &str) -> usize {
        self.by_parent
            .get(parent_id)
            .map(|l| l.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    /// Mark one notification read. Returns false if it was already read.
    pub async fn mark_read(&self, parent_id: &str, notification_id: &str) -> NestResult<bool> {
        let updated = {
            let mut list = self
                .by_parent
                .get_mut(parent_id)
                .ok_or_else(|| NestError::not_found(format!("Inbox for parent {}", parent_id)))?;
            let notification = list
                .iter_mut()
                .find(|n| n.id == notification_id)
                .ok_or_else(|| NestError::not_found(format!("Notification {}", notification_id)))?;
            if notification.read {
                return Ok(false);
            }
            notification.read = true;
            notification.clone()
        };

        put_json(
            self.store.as_ref(),
            collections::NOTIFICATIONS,
            &inbox_key(&updated),
            &updated,
        )
        .await?;
        Ok(true)
    }

    /// Reload every inbox from the store
    pub async fn recover(&self) -> NestResult<usize> {
        let stored: Vec<ParentalNotification> =
            list_json(self.store.as_ref(), collections::NOTIFICATIONS, None).await?;
        self.by_parent.clear();
        let count = stored.len();
        for notification in stored {
            self.by_parent
                .entry(notification.parent_id.clone())
                .or_default()
                .push(notification);
        }
        info!("Recovered {} inbox notifications", count);
        Ok(count)
    }
}
