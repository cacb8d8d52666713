//! Domain views of the persisted rows, as the UI layer consumes them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uplift_backend::{Attachment, DeliveryStatus, MessageRow, ReplyRef, UserRow};

/// Fixed text shown in place of a soft-deleted message
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Denormalized participant profile snapshot as of the last reconciliation.
/// A read cache, not authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub online_status: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<UserRow> for Participant {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            avatar_url: row.avatar_url,
            role: row.role,
            online_status: row.online_status,
            last_seen: row.last_seen,
        }
    }
}

/// Message with reply reference and attachments resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub reply_to: Option<ReplyRef>,
    pub attachments: Vec<Attachment>,
    pub read: bool,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

impl Message {
    /// Build the domain view of a row. Structured reply/attachment columns
    /// win; rows written by old clients fall back to the inline-marker shim.
    pub fn from_row(row: MessageRow) -> Self {
        let deleted = row.deleted_at.is_some();

        let (text, reply_to, attachments) =
            if row.reply_to.is_none() && row.attachments.is_empty() {
                let decoded = crate::legacy::decode(&row.text);
                (decoded.text, decoded.reply_to, decoded.attachments)
            } else {
                (row.text, row.reply_to, row.attachments)
            };

        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            text: if deleted {
                DELETED_PLACEHOLDER.to_string()
            } else {
                text
            },
            reply_to,
            attachments,
            read: row.read,
            status: row.status,
            created_at: row.created_at,
            deleted,
        }
    }
}

/// Conversation enriched with participant profiles, last-message preview and
/// unread count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [String; 2],
    pub participant_details: Vec<Participant>,
    pub last_message: Option<Message>,
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Profile snapshot of the participant that is not `user_id`
    pub fn other_participant(&self, user_id: &str) -> Option<&Participant> {
        self.participant_details.iter().find(|p| p.id != user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy;
    use uplift_backend::AttachmentKind;

    fn row(text: &str) -> MessageRow {
        MessageRow {
            id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            text: text.to_string(),
            reply_to: None,
            attachments: Vec::new(),
            read: false,
            status: DeliveryStatus::Sent,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn delivery_status_never_regresses() {
        assert_eq!(
            DeliveryStatus::Read.advance_to(DeliveryStatus::Sent),
            DeliveryStatus::Read
        );
        assert_eq!(
            DeliveryStatus::Sent.advance_to(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered
        );
    }

    #[test]
    fn deleted_row_renders_the_placeholder() {
        let mut deleted = row("original text");
        deleted.deleted_at = Some(Utc::now());

        let message = Message::from_row(deleted);
        assert_eq!(message.text, DELETED_PLACEHOLDER);
        assert!(message.deleted);
    }

    #[test]
    fn legacy_marker_text_decodes_into_structured_fields() {
        let attachments = vec![Attachment {
            kind: AttachmentKind::Image,
            url: "https://x/1.png".to_string(),
            filename: None,
            thumbnail: None,
        }];
        let legacy_row = row(&legacy::encode("photo incoming", None, &attachments));

        let message = Message::from_row(legacy_row);
        assert_eq!(message.text, "photo incoming");
        assert_eq!(message.attachments, attachments);
    }
}
