//! Uplift Backend - collaborator contracts for the messaging core
//!
//! The messaging core treats everything outside itself as an external
//! collaborator with a narrow contract. This crate defines those contracts:
//!
//! - **ChatBackend**: CRUD over the `users`, `conversations` and `messages`
//!   tables of the hosted row store
//! - **Realtime**: row-level change subscriptions for the `messages` and
//!   `conversations` tables
//! - **PresenceHub / PresenceChannel**: ephemeral presence channels with
//!   track/untrack and sync/join/leave events
//! - **Notifier**: fire-and-forget push and email delivery
//!
//! It also ships a complete in-process implementation, [`MemoryBackend`],
//! which backs the integration tests and the demo session.

pub mod memory;
pub mod notify;
pub mod presence;
pub mod realtime;
pub mod store;
pub mod types;

pub use memory::{MemoryBackend, MemoryPresenceChannel};
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use presence::{ChannelStatus, PresenceEvent, PresencePayload};
pub use realtime::{PresenceChannel, PresenceHub, Realtime};
pub use store::ChatBackend;
pub use types::{
    Attachment, AttachmentKind, ChangeEvent, ChangeKind, ConversationRow, DeliveryStatus,
    MessageRow, NotificationRow, ReplyRef, Table, UserRow,
};

/// Configuration for the messaging and presence core
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Trailing-edge debounce window for full conversation reloads (default: 300ms)
    pub reload_debounce_ms: u64,

    /// Failsafe that force-clears a stuck in-flight load flag (default: 30s)
    pub load_failsafe_secs: u64,

    /// Grace period before an offline transition is actually tracked (default: 1500ms)
    pub offline_grace_ms: u64,

    /// Timeout for the initial profile fetch at session start (default: 5s)
    pub profile_timeout_secs: u64,

    /// Retention window within which a sender may delete a message (default: 1h)
    pub delete_window_secs: u64,

    /// Name of the shared global presence channel
    pub global_presence_channel: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reload_debounce_ms: 300,
            load_failsafe_secs: 30,
            offline_grace_ms: 1500,
            profile_timeout_secs: 5,
            delete_window_secs: 3600, // 1 hour
            global_presence_channel: "online-users".to_string(),
        }
    }
}
