//! Row and change-event types shared across the backend contracts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User profile row as persisted in the `users` table
///
/// `online_status` and `last_seen` are a best-effort fallback only; the
/// ephemeral presence channel is authoritative for "online right now".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub online_status: bool,
    pub last_seen: Option<DateTime<Utc>>,
    /// Per-user preference gating message notifications
    pub message_notifications: bool,
}

/// Conversation row as persisted in the `conversations` table
///
/// `participants` is stored sorted; the backend guarantees at most one row
/// per unordered pair. Rows are never hard-deleted: `deleted_by` holds the
/// ids of users who have hidden the conversation on their side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub participants: [String; 2],
    pub deleted_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRow {
    /// The participant that is not `user_id`, if any
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.as_str() != user_id)
            .map(|p| p.as_str())
    }
}

/// Delivery status of a message, strictly forward-moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    /// Advance to `next` without ever regressing
    pub fn advance_to(self, next: DeliveryStatus) -> DeliveryStatus {
        self.max(next)
    }
}

/// Attachment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
}

/// A single message attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Reference to the message being replied to, resolved eagerly at send time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub snippet: String,
}

/// Message row as persisted in the `messages` table
///
/// `reply_to` and `attachments` are structured columns. Older deployments
/// packed them into `text` behind inline markers; see the decode shim in
/// the chat crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub reply_to: Option<ReplyRef>,
    pub attachments: Vec<Attachment>,
    pub read: bool,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Notification row written when a recipient has notifications enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub reference_id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Table a change event originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Messages,
    Conversations,
}

/// Kind of row-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-level change notification delivered by the realtime feed
///
/// Events are triggers to re-fetch current truth for the affected scope;
/// neither their ordering nor their payload is trusted. `conversation_id`
/// is present when the payload carries it (delete payloads may not).
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub conversation_id: Option<String>,
    pub row_id: Option<String>,
}
