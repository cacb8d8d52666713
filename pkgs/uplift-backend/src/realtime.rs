//! Realtime change-feed and presence-channel contracts

use crate::presence::{ChannelStatus, PresenceEvent, PresencePayload};
use crate::types::ChangeEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Row-level change subscriptions, independent per table
pub trait Realtime: Send + Sync {
    /// Subscribe to changes on the `messages` table
    fn message_changes(&self) -> mpsc::UnboundedReceiver<ChangeEvent>;

    /// Subscribe to changes on the `conversations` table
    fn conversation_changes(&self) -> mpsc::UnboundedReceiver<ChangeEvent>;
}

/// Handle to one ephemeral presence channel membership
///
/// Lifecycle: `subscribe` must resolve to [`ChannelStatus::Subscribed`]
/// before `track` is valid. Cleanup is untrack, then unsubscribe.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn subscribe(&self) -> Result<ChannelStatus>;

    /// Publish this member's presence payload; re-tracking upserts it
    async fn track(&self, payload: PresencePayload) -> Result<()>;

    async fn untrack(&self) -> Result<()>;

    async fn unsubscribe(&self) -> Result<()>;

    /// New event subscription stream for this channel
    fn events(&self) -> mpsc::UnboundedReceiver<PresenceEvent>;
}

/// Factory for presence channels keyed by channel name
pub trait PresenceHub: Send + Sync {
    /// Channel handle for `name`, tracking under the member key `key`.
    /// Requests for the same name share the same underlying channel.
    fn channel(&self, name: &str, key: &str) -> Arc<dyn PresenceChannel>;
}
