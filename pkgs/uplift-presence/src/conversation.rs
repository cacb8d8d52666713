//! Per-conversation presence, one channel per open conversation.

use crate::error::PresenceError;
use crate::tracker::apply_presence_event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use uplift_backend::{ChannelStatus, PresenceChannel, PresenceHub, PresencePayload};

struct JoinedChannel {
    channel: Arc<dyn PresenceChannel>,
    peers: Arc<Mutex<HashMap<String, PresencePayload>>>,
    pump: JoinHandle<()>,
}

/// Registry of conversation channels the local user has joined.
///
/// Members track with `online: false` on join; flipping the flag with
/// [`set_active`](Self::set_active) means "this conversation is on screen",
/// which peers use to decide whether a new message needs a notification.
pub struct ConversationPresence {
    hub: Arc<dyn PresenceHub>,
    user_id: String,
    user_name: String,
    channels: tokio::sync::Mutex<HashMap<String, JoinedChannel>>,
}

impl ConversationPresence {
    pub fn new(
        hub: Arc<dyn PresenceHub>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            hub,
            user_id: user_id.into(),
            user_name: user_name.into(),
            channels: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Join a conversation's presence channel; joining twice is a no-op.
    pub async fn join(&self, conversation_id: &str) -> Result<(), PresenceError> {
        let mut channels = self.channels.lock().await;
        if channels.contains_key(conversation_id) {
            return Ok(());
        }

        let name = format!("conversation:{conversation_id}");
        let channel = self.hub.channel(&name, &self.user_id);
        let peers: Arc<Mutex<HashMap<String, PresencePayload>>> = Arc::default();

        let pump = {
            let peers = Arc::clone(&peers);
            let mut events = channel.events();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    apply_presence_event(&mut peers.lock(), event, false);
                }
            })
        };

        let status = match channel.subscribe().await {
            Ok(status) => status,
            Err(e) => {
                pump.abort();
                return Err(e.into());
            }
        };
        if status != ChannelStatus::Subscribed {
            pump.abort();
            return Err(PresenceError::SubscribeFailed(status));
        }
        channel
            .track(PresencePayload::new(&self.user_id, &self.user_name, false))
            .await?;

        channels.insert(
            conversation_id.to_string(),
            JoinedChannel {
                channel,
                peers,
                pump,
            },
        );
        Ok(())
    }

    /// Mark the conversation as on screen (or not) for peers to see
    pub async fn set_active(&self, conversation_id: &str, active: bool) -> Result<(), PresenceError> {
        let channels = self.channels.lock().await;
        let Some(joined) = channels.get(conversation_id) else {
            return Err(PresenceError::NotJoined(conversation_id.to_string()));
        };
        joined
            .channel
            .track(PresencePayload::new(&self.user_id, &self.user_name, active))
            .await?;
        Ok(())
    }

    /// Whether `peer_id` currently has this conversation on screen
    pub async fn peer_active(&self, conversation_id: &str, peer_id: &str) -> bool {
        let channels = self.channels.lock().await;
        channels
            .get(conversation_id)
            .and_then(|joined| joined.peers.lock().get(peer_id).map(|p| p.online))
            .unwrap_or(false)
    }

    /// Leave one conversation channel: untrack, unsubscribe, drop
    pub async fn leave(&self, conversation_id: &str) {
        let joined = self.channels.lock().await.remove(conversation_id);
        let Some(joined) = joined else {
            return;
        };
        Self::teardown(conversation_id, joined).await;
    }

    /// Leave every joined channel
    pub async fn stop(&self) {
        let drained: Vec<_> = self.channels.lock().await.drain().collect();
        for (conversation_id, joined) in drained {
            Self::teardown(&conversation_id, joined).await;
        }
    }

    async fn teardown(conversation_id: &str, joined: JoinedChannel) {
        if let Err(e) = joined.channel.untrack().await {
            debug!(conversation_id, "untrack failed: {e:#}");
        }
        if let Err(e) = joined.channel.unsubscribe().await {
            debug!(conversation_id, "unsubscribe failed: {e:#}");
        }
        joined.pump.abort();
    }
}
