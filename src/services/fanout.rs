//! Notification fanout.
//!
//! Creation persists first; pushing comes after, so a notification is
//! never visible on a live channel without being durable. The three push
//! channels (in-app toast, browser push relay, unread counter) run
//! independently: one failing or finding nobody connected does not stop
//! the others, and none of them can fail the caller. The unread counter
//! is always re-derived from the store, never incremented in place.

use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::push_sender::BrowserPushSender;
use super::store::NotificationStore;
use crate::error::Result;
use crate::metrics;
use crate::models::{Notification, NotificationPayload};
use crate::websocket::{ConnectionRegistry, ServerEvent};

pub struct NotificationFanout {
    store: Arc<dyn NotificationStore>,
    registry: ConnectionRegistry,
    push: BrowserPushSender,
}

impl NotificationFanout {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        registry: ConnectionRegistry,
        push: BrowserPushSender,
    ) -> Self {
        Self {
            store,
            registry,
            push,
        }
    }

    /// Create a notification and fan it out.
    ///
    /// Only the persist step can fail; a notification that comes back Ok
    /// is durable regardless of what the push channels did.
    pub async fn notify(
        &self,
        recipient_id: Uuid,
        payload: NotificationPayload,
    ) -> Result<Notification> {
        let notification = self.store.create(recipient_id, payload).await?;
        metrics::observe_notification_created();
        self.dispatch(&notification).await;
        Ok(notification)
    }

    async fn dispatch(&self, notification: &Notification) {
        let toast = async {
            match ServerEvent::notification(notification.clone()).to_json() {
                Ok(payload) => {
                    let delivered = self
                        .registry
                        .push_to_subject(notification.recipient_id, &payload)
                        .await;
                    let outcome = if delivered > 0 { "delivered" } else { "skipped" };
                    metrics::observe_notification_push("toast", outcome);
                }
                Err(e) => {
                    error!("failed to serialize toast event: {e}");
                    metrics::observe_notification_push("toast", "failed");
                }
            }
        };
        let counter = self.push_unread_count(notification.recipient_id);
        let browser = self.push.send(notification);

        futures::join!(toast, counter, browser);
    }

    /// Derive the subject's unread count from the store and push it to
    /// every connection they hold.
    pub async fn push_unread_count(&self, subject: Uuid) {
        let count = match self.store.unread_count(subject).await {
            Ok(count) => count,
            Err(e) => {
                warn!("unread count unavailable for {}: {}", subject, e);
                metrics::observe_notification_push("unread_counter", "failed");
                return;
            }
        };

        match ServerEvent::unread_count(count).to_json() {
            Ok(payload) => {
                let delivered = self.registry.push_to_subject(subject, &payload).await;
                let outcome = if delivered > 0 { "delivered" } else { "skipped" };
                metrics::observe_notification_push("unread_counter", outcome);
            }
            Err(e) => {
                error!("failed to serialize unread count event: {e}");
                metrics::observe_notification_push("unread_counter", "failed");
            }
        }
    }
}
