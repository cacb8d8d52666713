//! Uplift Chat - conversation store and messaging operations
//!
//! Holds the authoritative in-session list of the current user's
//! conversations, enriched with participant profiles, last-message previews
//! and unread counts, and serves every messaging operation against it:
//! batched full reloads, cheap single-conversation updates, message send
//! with notification side effects, sender-only delete inside the retention
//! window, mark-as-read and per-user conversation hiding.

pub mod error;
pub mod legacy;
pub mod models;
pub mod store;

pub use error::ChatError;
pub use models::{Conversation, Message, Participant, DELETED_PLACEHOLDER};
pub use store::ConversationStore;

// Row-level field types, re-exported for callers composing messages
pub use uplift_backend::{Attachment, AttachmentKind, DeliveryStatus, ReplyRef};
