//! Built-in delivery channels

use async_trait::async_trait;
use nestguard_core::{ChannelKind, NestResult, NotificationChannel, ParentalNotification};
use tracing::info;

/// Channel that writes notifications to the tracing log
///
/// Useful as a stand-in until a host registers real device channels.
#[derive(Debug, Clone, Copy)]
pub struct TracingChannel {
    kind: ChannelKind,
}

impl TracingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for TracingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, notification: &ParentalNotification) -> NestResult<()> {
        info!(
            channel = %self.kind,
            parent = %notification.parent_id,
            child = %notification.child_id,
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}
