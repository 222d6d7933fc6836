use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable notification record owned by exactly one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,

    /// Recipient user ID
    pub recipient_id: Uuid,

    /// Short headline shown in toasts and the notification tray
    pub title: String,

    /// Notification body/message
    pub body: String,

    /// Optional deep link into the application
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Read status
    pub is_read: bool,

    /// Timestamp of the first mark-read, if any
    pub read_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Content for a notification about to be created.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

/// Request to create and fan out a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

impl CreateNotificationRequest {
    pub fn payload(&self) -> NotificationPayload {
        NotificationPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            link: self.link.clone(),
        }
    }
}
