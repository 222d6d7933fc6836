//! Browser push relay client.
//!
//! Delivery is handled by an external relay that holds the Web Push
//! subscriptions; this client only forwards the notification content.
//! The channel is strictly best effort: an unconfigured relay or a failed
//! request is logged and counted, never surfaced to the caller.

use anyhow::bail;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::metrics;
use crate::models::Notification;

const RELAY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BrowserPushSender {
    client: reqwest::Client,
    relay_url: Option<String>,
    relay_token: Option<String>,
}

impl BrowserPushSender {
    pub fn from_config(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            relay_url: config.push_relay.url.clone(),
            relay_token: config.push_relay.token.clone(),
        }
    }

    /// Forward a notification to the relay. Never fails the caller.
    pub async fn send(&self, notification: &Notification) {
        let Some(url) = &self.relay_url else {
            debug!("push relay not configured, skipping browser push");
            metrics::observe_notification_push("browser_push", "skipped");
            return;
        };

        match self.deliver(url, notification).await {
            Ok(()) => {
                debug!(
                    "browser push forwarded for notification {}",
                    notification.id
                );
                metrics::observe_notification_push("browser_push", "delivered");
            }
            Err(e) => {
                warn!(
                    "browser push failed for notification {}: {}",
                    notification.id, e
                );
                metrics::observe_notification_push("browser_push", "failed");
            }
        }
    }

    async fn deliver(&self, url: &str, notification: &Notification) -> anyhow::Result<()> {
        let mut request = self.client.post(format!("{url}/push")).json(&json!({
            "recipient_id": notification.recipient_id,
            "title": notification.title,
            "body": notification.body,
            "link": notification.link,
        }));

        if let Some(token) = &self.relay_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            bail!("relay returned {}", response.status());
        }
        Ok(())
    }
}
