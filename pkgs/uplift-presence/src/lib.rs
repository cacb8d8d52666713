//! Presence tracking built on ephemeral broadcast channels.
//!
//! The global tracker answers "who is online right now", the conversation
//! registry answers "is my peer looking at this conversation", and the
//! lifecycle coordinator maps app foreground/background transitions onto
//! both. Channel deltas carry timestamps so a stale leave from a previous
//! connection can never knock a freshly joined user offline.

mod conversation;
mod error;
mod lifecycle;
mod tracker;

pub use conversation::ConversationPresence;
pub use error::PresenceError;
pub use lifecycle::{AppState, LifecycleCoordinator};
pub use tracker::{apply_presence_event, ChannelState, PresenceTracker};
