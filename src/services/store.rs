//! Durable notification storage.
//!
//! The store is the source of truth for unread state; everything pushed
//! over the realtime channel is derived from it, never the other way
//! around. Two implementations exist: Postgres for real deployments and
//! an in-memory store used when no DATABASE_URL is configured and by
//! tests.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Notification, NotificationPayload};

/// Cap on a single unread listing; the client re-requests to catch up
/// beyond this.
pub const MAX_UNREAD_PAGE: i64 = 100;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new, unread notification for the recipient.
    async fn create(&self, recipient_id: Uuid, payload: NotificationPayload) -> Result<Notification>;

    /// Mark one notification read. The requester must own it; marking an
    /// already-read notification succeeds without changing `read_at`.
    async fn mark_read(&self, id: Uuid, requester: Uuid) -> Result<()>;

    /// Mark everything unread as read, returning how many rows changed.
    async fn mark_all_read(&self, requester: Uuid) -> Result<u64>;

    /// Unread notifications, newest first, capped at [`MAX_UNREAD_PAGE`].
    async fn list_unread(&self, recipient_id: Uuid) -> Result<Vec<Notification>>;

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64>;
}

/// Postgres-backed store.
pub struct PgNotificationStore {
    db: PgPool,
}

impl PgNotificationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn notification_from_row(row: &PgRow) -> Notification {
    Notification {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        title: row.get("title"),
        body: row.get("body"),
        link: row.get("link"),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, recipient_id: Uuid, payload: NotificationPayload) -> Result<Notification> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let query = r#"
            INSERT INTO notifications (id, recipient_id, title, body, link, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, false, $6)
            RETURNING id, recipient_id, title, body, link, is_read, read_at, created_at
        "#;

        let row = sqlx::query(query)
            .bind(id)
            .bind(recipient_id)
            .bind(&payload.title)
            .bind(&payload.body)
            .bind(&payload.link)
            .bind(now)
            .fetch_one(&self.db)
            .await?;

        info!("created notification {} for recipient {}", id, recipient_id);
        Ok(notification_from_row(&row))
    }

    async fn mark_read(&self, id: Uuid, requester: Uuid) -> Result<()> {
        let now = Utc::now();

        // The recipient predicate makes ownership part of the lookup, so a
        // foreign id and a missing id are indistinguishable to the caller.
        // COALESCE keeps the first read timestamp on repeat calls.
        let query = r#"
            UPDATE notifications
            SET is_read = true, read_at = COALESCE(read_at, $1)
            WHERE id = $2 AND recipient_id = $3
            RETURNING id
        "#;

        let row = sqlx::query(query)
            .bind(now)
            .bind(id)
            .bind(requester)
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(_) => Ok(()),
            None => Err(AppError::NotificationNotFound),
        }
    }

    async fn mark_all_read(&self, requester: Uuid) -> Result<u64> {
        let now = Utc::now();
        let query = r#"
            UPDATE notifications
            SET is_read = true, read_at = COALESCE(read_at, $1)
            WHERE recipient_id = $2 AND is_read = false
        "#;

        let result = sqlx::query(query)
            .bind(now)
            .bind(requester)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_unread(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        let query = r#"
            SELECT id, recipient_id, title, body, link, is_read, read_at, created_at
            FROM notifications
            WHERE recipient_id = $1 AND is_read = false
            ORDER BY created_at DESC, id DESC
            LIMIT $2
        "#;

        let rows = sqlx::query(query)
            .bind(recipient_id)
            .bind(MAX_UNREAD_PAGE)
            .fetch_all(&self.db)
            .await?;

        Ok(rows.iter().map(notification_from_row).collect())
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let query = r#"
            SELECT COUNT(*) AS count
            FROM notifications
            WHERE recipient_id = $1 AND is_read = false
        "#;

        let row = sqlx::query(query)
            .bind(recipient_id)
            .fetch_one(&self.db)
            .await?;

        Ok(row.get("count"))
    }
}

/// In-memory store keyed by recipient, holding notifications in creation
/// order. Used for database-less deployments and tests.
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    notifications: Arc<RwLock<HashMap<Uuid, Vec<Notification>>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, recipient_id: Uuid, payload: NotificationPayload) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            title: payload.title,
            body: payload.body,
            link: payload.link,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        let mut notifications = self.notifications.write().await;
        notifications
            .entry(recipient_id)
            .or_default()
            .push(notification.clone());
        Ok(notification)
    }

    async fn mark_read(&self, id: Uuid, requester: Uuid) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        let owned = notifications
            .get_mut(&requester)
            .and_then(|list| list.iter_mut().find(|n| n.id == id));

        match owned {
            Some(n) => {
                n.is_read = true;
                if n.read_at.is_none() {
                    n.read_at = Some(Utc::now());
                }
                Ok(())
            }
            None => Err(AppError::NotificationNotFound),
        }
    }

    async fn mark_all_read(&self, requester: Uuid) -> Result<u64> {
        let mut notifications = self.notifications.write().await;
        let now = Utc::now();
        let mut updated = 0;

        if let Some(list) = notifications.get_mut(&requester) {
            for n in list.iter_mut().filter(|n| !n.is_read) {
                n.is_read = true;
                n.read_at = Some(now);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn list_unread(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let unread = notifications
            .get(&recipient_id)
            .map(|list| {
                list.iter()
                    .rev()
                    .filter(|n| !n.is_read)
                    .take(MAX_UNREAD_PAGE as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(unread)
    }

    async fn unread_count(&self, recipient_id: Uuid) -> Result<i64> {
        let notifications = self.notifications.read().await;
        let count = notifications
            .get(&recipient_id)
            .map(|list| list.iter().filter(|n| !n.is_read).count())
            .unwrap_or(0);
        Ok(count as i64)
    }
}
