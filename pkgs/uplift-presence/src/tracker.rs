//! Global online-presence tracker.

use crate::error::PresenceError;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uplift_backend::{
    ChannelStatus, ChatBackend, PresenceChannel, PresenceEvent, PresenceHub, PresencePayload,
    SyncConfig,
};

/// Subscription state of the global presence channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

/// Fold one channel event into a presence map, last writer wins.
///
/// `Sync` is authoritative and replaces the whole map. `Join` and `Leave`
/// are deltas and only apply when their payload is at least as fresh as the
/// entry they would overwrite, so a leave left over from a previous
/// connection cannot knock out a newer join. With `online_only` set,
/// members whose payload says `online: false` are dropped rather than kept.
pub fn apply_presence_event(
    members: &mut HashMap<String, PresencePayload>,
    event: PresenceEvent,
    online_only: bool,
) {
    match event {
        PresenceEvent::Sync(state) => {
            *members = if online_only {
                state.into_iter().filter(|(_, p)| p.online).collect()
            } else {
                state
            };
        }
        PresenceEvent::Join { key, payload } => {
            if let Some(current) = members.get(&key) {
                if current.timestamp > payload.timestamp {
                    debug!(%key, "ignoring stale presence join");
                    return;
                }
            }
            if online_only && !payload.online {
                members.remove(&key);
            } else {
                members.insert(key, payload);
            }
        }
        PresenceEvent::Leave { key, payload } => {
            if let Some(current) = members.get(&key) {
                if current.timestamp > payload.timestamp {
                    debug!(%key, "ignoring stale presence leave");
                    return;
                }
            }
            members.remove(&key);
        }
    }
}

/// Tracks who is online on the shared global presence channel and mirrors
/// the local user's own state onto it.
///
/// Going offline is debounced by `offline_grace_ms` so a brief background
/// flicker does not broadcast a leave; any `go_online` inside the grace
/// window cancels the pending transition.
pub struct PresenceTracker {
    backend: Arc<dyn ChatBackend>,
    hub: Arc<dyn PresenceHub>,
    config: SyncConfig,
    user_id: String,
    user_name: String,
    channel: Mutex<Option<Arc<dyn PresenceChannel>>>,
    state: Mutex<ChannelState>,
    members: Arc<Mutex<HashMap<String, PresencePayload>>>,
    offline_timer: Mutex<Option<JoinHandle<()>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceTracker {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        hub: Arc<dyn PresenceHub>,
        config: SyncConfig,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            hub,
            config,
            user_id: user_id.into(),
            user_name: user_name.into(),
            channel: Mutex::new(None),
            state: Mutex::new(ChannelState::Unsubscribed),
            members: Arc::new(Mutex::new(HashMap::new())),
            offline_timer: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// User ids currently tracked as online
    pub fn online_users(&self) -> HashSet<String> {
        self.members.lock().keys().cloned().collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.members.lock().contains_key(user_id)
    }

    /// Announce the local user as online.
    ///
    /// Subscribes the global channel first if needed; tracking before the
    /// subscription is acknowledged is rejected by the channel, so the two
    /// steps are strictly ordered here. Re-entrant calls while a transition
    /// is in flight are dropped.
    pub async fn go_online(&self) -> Result<(), PresenceError> {
        if let Some(timer) = self.offline_timer.lock().take() {
            timer.abort();
        }

        let state = *self.state.lock();
        match state {
            ChannelState::Subscribed => {
                let channel = self.channel.lock().clone();
                if let Some(channel) = channel {
                    channel
                        .track(PresencePayload::new(&self.user_id, &self.user_name, true))
                        .await?;
                }
            }
            ChannelState::Subscribing | ChannelState::Unsubscribing => {
                debug!(?state, "presence channel busy, skipping go_online");
                return Ok(());
            }
            ChannelState::Unsubscribed => {
                *self.state.lock() = ChannelState::Subscribing;
                let channel = self
                    .hub
                    .channel(&self.config.global_presence_channel, &self.user_id);
                // The event stream must exist before subscribing, or the
                // authoritative sync snapshot is missed.
                self.spawn_pump(channel.events());
                let status = match channel.subscribe().await {
                    Ok(status) => status,
                    Err(e) => {
                        *self.state.lock() = ChannelState::Unsubscribed;
                        return Err(e.into());
                    }
                };
                if status != ChannelStatus::Subscribed {
                    *self.state.lock() = ChannelState::Unsubscribed;
                    return Err(PresenceError::SubscribeFailed(status));
                }
                *self.state.lock() = ChannelState::Subscribed;
                // The handle is stored before the first track so a track
                // failure leaves a retryable subscribed channel, not a
                // subscribed state with no channel behind it.
                *self.channel.lock() = Some(Arc::clone(&channel));
                channel
                    .track(PresencePayload::new(&self.user_id, &self.user_name, true))
                    .await?;
            }
        }

        self.persist_status(true);
        Ok(())
    }

    /// Schedule the offline transition after the grace window.
    ///
    /// The actual untrack only happens if no `go_online` arrives in the
    /// meantime; repeated calls restart the timer.
    pub fn mark_offline(self: &Arc<Self>) {
        let mut slot = self.offline_timer.lock();
        if let Some(timer) = slot.take() {
            timer.abort();
        }
        let tracker = Arc::clone(self);
        let grace = Duration::from_millis(self.config.offline_grace_ms);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracker.untrack_now().await;
        }));
    }

    /// Tear everything down: pending timers, channel membership, pump task.
    pub async fn stop(&self) {
        if let Some(timer) = self.offline_timer.lock().take() {
            timer.abort();
        }
        *self.state.lock() = ChannelState::Unsubscribing;
        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            if let Err(e) = channel.untrack().await {
                debug!("untrack on stop failed: {e:#}");
            }
            if let Err(e) = channel.unsubscribe().await {
                debug!("unsubscribe on stop failed: {e:#}");
            }
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.members.lock().clear();
        *self.state.lock() = ChannelState::Unsubscribed;
        self.persist_status(false);
    }

    async fn untrack_now(&self) {
        let channel = self.channel.lock().clone();
        if let Some(channel) = channel {
            if let Err(e) = channel.untrack().await {
                warn!("failed to untrack presence: {e:#}");
            }
        }
        self.persist_status(false);
    }

    /// Persisted `online_status` / `last_seen` is a fallback for clients
    /// that are not on the channel; the write is fire-and-forget.
    fn persist_status(&self, online: bool) {
        let backend = Arc::clone(&self.backend);
        let user_id = self.user_id.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.set_online_status(&user_id, online, Utc::now()).await {
                warn!(%user_id, "failed to persist online status: {e:#}");
            }
        });
    }

    fn spawn_pump(&self, mut events: mpsc::UnboundedReceiver<PresenceEvent>) {
        let members = Arc::clone(&self.members);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                apply_presence_event(&mut members.lock(), event, true);
            }
        });
        let mut pump = self.pump.lock();
        if let Some(old) = pump.take() {
            old.abort();
        }
        *pump = Some(handle);
    }
}
