//! In-process backend implementing every collaborator contract
//!
//! Backs the integration tests and the demo session. Tables are hashmaps
//! under `parking_lot` locks; change and presence events fan out over
//! unbounded mpsc channels, mirroring the hosted store's row-level feed.

use crate::presence::{ChannelStatus, PresenceEvent, PresencePayload};
use crate::realtime::{PresenceChannel, PresenceHub, Realtime};
use crate::store::ChatBackend;
use crate::types::{
    ChangeEvent, ChangeKind, ConversationRow, DeliveryStatus, MessageRow, NotificationRow, Table,
    UserRow,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-memory row store, realtime feed and presence hub
#[derive(Default)]
pub struct MemoryBackend {
    users: Mutex<HashMap<String, UserRow>>,
    conversations: Mutex<HashMap<String, ConversationRow>>,
    messages: Mutex<HashMap<String, MessageRow>>,
    notifications: Mutex<Vec<NotificationRow>>,
    message_listeners: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
    conversation_listeners: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
    presence_channels: Mutex<HashMap<String, Arc<SharedPresence>>>,
    conversation_load_calls: AtomicUsize,
    read_delay: Mutex<Option<std::time::Duration>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user profile row
    pub fn insert_user(&self, row: UserRow) {
        self.users.lock().insert(row.id.clone(), row);
    }

    pub fn user(&self, id: &str) -> Option<UserRow> {
        self.users.lock().get(id).cloned()
    }

    pub fn notifications(&self) -> Vec<NotificationRow> {
        self.notifications.lock().clone()
    }

    /// How many batched conversation reads have been issued; lets tests
    /// assert that debounced bursts coalesce into a single reload
    pub fn conversation_load_count(&self) -> usize {
        self.conversation_load_calls.load(Ordering::SeqCst)
    }

    /// Inject latency into conversation reads, so tests can observe
    /// behavior while a load is in flight
    pub fn set_read_delay(&self, delay: Option<std::time::Duration>) {
        *self.read_delay.lock() = delay;
    }

    fn emit_message_event(&self, event: ChangeEvent) {
        self.message_listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn emit_conversation_event(&self, event: ChangeEvent) {
        self.conversation_listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn sorted_pair(a: &str, b: &str) -> [String; 2] {
        let mut pair = [a.to_string(), b.to_string()];
        pair.sort();
        pair
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.conversation_load_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let convs = self.conversations.lock();
        Ok(convs
            .values()
            .filter(|c| {
                c.participants.iter().any(|p| p == user_id)
                    && !c.deleted_by.iter().any(|u| u == user_id)
            })
            .cloned()
            .collect())
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        let users = self.users.lock();
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn latest_messages(
        &self,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, MessageRow>> {
        let messages = self.messages.lock();
        let mut latest: HashMap<String, MessageRow> = HashMap::new();
        for msg in messages.values() {
            if msg.deleted_at.is_some() {
                continue;
            }
            if !conversation_ids.iter().any(|id| *id == msg.conversation_id) {
                continue;
            }
            match latest.get(&msg.conversation_id) {
                Some(current) if current.created_at >= msg.created_at => {}
                _ => {
                    latest.insert(msg.conversation_id.clone(), msg.clone());
                }
            }
        }
        Ok(latest)
    }

    async fn unread_counts(
        &self,
        conversation_ids: &[String],
        user_id: &str,
    ) -> Result<HashMap<String, u32>> {
        let messages = self.messages.lock();
        let mut counts: HashMap<String, u32> = conversation_ids
            .iter()
            .map(|id| (id.clone(), 0))
            .collect();
        for msg in messages.values() {
            if msg.sender_id == user_id || msg.read || msg.deleted_at.is_some() {
                continue;
            }
            if let Some(count) = counts.get_mut(&msg.conversation_id) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn conversation_by_id(&self, id: &str) -> Result<Option<ConversationRow>> {
        Ok(self.conversations.lock().get(id).cloned())
    }

    async fn find_pair_conversation(&self, a: &str, b: &str) -> Result<Option<ConversationRow>> {
        let pair = Self::sorted_pair(a, b);
        Ok(self
            .conversations
            .lock()
            .values()
            .find(|c| c.participants == pair)
            .cloned())
    }

    async fn create_conversation(
        &self,
        caller_id: &str,
        other_id: &str,
    ) -> Result<ConversationRow> {
        let pair = Self::sorted_pair(caller_id, other_id);
        let now = Utc::now();

        // Uniqueness over the sorted pair is resolved under one lock, so a
        // concurrent first contact from both sides collapses to fetch-existing.
        let (row, event) = {
            let mut convs = self.conversations.lock();
            if let Some(existing) = convs.values_mut().find(|c| c.participants == pair) {
                existing.deleted_by.retain(|u| u != caller_id);
                (
                    existing.clone(),
                    ChangeEvent {
                        table: Table::Conversations,
                        kind: ChangeKind::Update,
                        conversation_id: Some(existing.id.clone()),
                        row_id: Some(existing.id.clone()),
                    },
                )
            } else {
                let row = ConversationRow {
                    id: Uuid::new_v4().to_string(),
                    participants: pair,
                    deleted_by: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                convs.insert(row.id.clone(), row.clone());
                (
                    row.clone(),
                    ChangeEvent {
                        table: Table::Conversations,
                        kind: ChangeKind::Insert,
                        conversation_id: Some(row.id.clone()),
                        row_id: Some(row.id),
                    },
                )
            }
        };
        self.emit_conversation_event(event);
        Ok(row)
    }

    async fn insert_message(&self, row: MessageRow) -> Result<()> {
        let event = ChangeEvent {
            table: Table::Messages,
            kind: ChangeKind::Insert,
            conversation_id: Some(row.conversation_id.clone()),
            row_id: Some(row.id.clone()),
        };
        self.messages.lock().insert(row.id.clone(), row);
        self.emit_message_event(event);
        Ok(())
    }

    async fn message_by_id(&self, id: &str) -> Result<Option<MessageRow>> {
        Ok(self.messages.lock().get(id).cloned())
    }

    async fn soft_delete_message(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        placeholder: &str,
    ) -> Result<()> {
        let event = {
            let mut messages = self.messages.lock();
            let Some(row) = messages.get_mut(id) else {
                bail!("message not found: {}", id);
            };
            row.deleted_at = Some(deleted_at);
            row.text = placeholder.to_string();
            ChangeEvent {
                table: Table::Messages,
                kind: ChangeKind::Update,
                conversation_id: Some(row.conversation_id.clone()),
                row_id: Some(row.id.clone()),
            }
        };
        self.emit_message_event(event);
        Ok(())
    }

    async fn mark_conversation_read(&self, conversation_id: &str, reader_id: &str) -> Result<()> {
        {
            let mut messages = self.messages.lock();
            for row in messages.values_mut() {
                if row.conversation_id == conversation_id && row.sender_id != reader_id {
                    row.read = true;
                    row.status = row.status.advance_to(DeliveryStatus::Read);
                }
            }
        }
        self.emit_message_event(ChangeEvent {
            table: Table::Messages,
            kind: ChangeKind::Update,
            conversation_id: Some(conversation_id.to_string()),
            row_id: None,
        });
        Ok(())
    }

    async fn hide_conversation(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        {
            let mut convs = self.conversations.lock();
            let Some(row) = convs.get_mut(conversation_id) else {
                bail!("conversation not found: {}", conversation_id);
            };
            if !row.deleted_by.iter().any(|u| u == user_id) {
                row.deleted_by.push(user_id.to_string());
            }
        }
        self.emit_conversation_event(ChangeEvent {
            table: Table::Conversations,
            kind: ChangeKind::Update,
            conversation_id: Some(conversation_id.to_string()),
            row_id: Some(conversation_id.to_string()),
        });
        Ok(())
    }

    async fn unhide_conversation(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let mut convs = self.conversations.lock();
        if let Some(row) = convs.get_mut(conversation_id) {
            row.deleted_by.retain(|u| u != user_id);
        }
        Ok(())
    }

    async fn touch_conversation(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()> {
        {
            let mut convs = self.conversations.lock();
            let Some(row) = convs.get_mut(conversation_id) else {
                bail!("conversation not found: {}", conversation_id);
            };
            row.updated_at = at;
        }
        self.emit_conversation_event(ChangeEvent {
            table: Table::Conversations,
            kind: ChangeKind::Update,
            conversation_id: Some(conversation_id.to_string()),
            row_id: Some(conversation_id.to_string()),
        });
        Ok(())
    }

    async fn set_online_status(
        &self,
        user_id: &str,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        let mut users = self.users.lock();
        if let Some(row) = users.get_mut(user_id) {
            row.online_status = online;
            row.last_seen = Some(last_seen);
        }
        Ok(())
    }

    async fn notification_pref(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .users
            .lock()
            .get(user_id)
            .map(|u| u.message_notifications)
            .unwrap_or(true))
    }

    async fn insert_notification(&self, row: NotificationRow) -> Result<()> {
        self.notifications.lock().push(row);
        Ok(())
    }
}

impl Realtime for MemoryBackend {
    fn message_changes(&self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.message_listeners.lock().push(tx);
        rx
    }

    fn conversation_changes(&self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.conversation_listeners.lock().push(tx);
        rx
    }
}

/// State shared by every handle to the same presence channel
struct SharedPresence {
    name: String,
    members: Mutex<HashMap<String, PresencePayload>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<PresenceEvent>>>,
}

impl SharedPresence {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn broadcast(&self, event: PresenceEvent) {
        self.listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Handle for one member key on an in-memory presence channel
pub struct MemoryPresenceChannel {
    key: String,
    shared: Arc<SharedPresence>,
    subscribed: AtomicBool,
}

#[async_trait]
impl PresenceChannel for MemoryPresenceChannel {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn subscribe(&self) -> Result<ChannelStatus> {
        self.subscribed.store(true, Ordering::SeqCst);
        // New subscribers receive an authoritative snapshot first
        let snapshot = self.shared.members.lock().clone();
        self.shared.broadcast(PresenceEvent::Sync(snapshot));
        Ok(ChannelStatus::Subscribed)
    }

    async fn track(&self, payload: PresencePayload) -> Result<()> {
        if !self.subscribed.load(Ordering::SeqCst) {
            bail!("presence channel {} is not subscribed", self.shared.name);
        }
        self.shared
            .members
            .lock()
            .insert(self.key.clone(), payload.clone());
        self.shared.broadcast(PresenceEvent::Join {
            key: self.key.clone(),
            payload,
        });
        Ok(())
    }

    async fn untrack(&self) -> Result<()> {
        let removed = self.shared.members.lock().remove(&self.key);
        if let Some(payload) = removed {
            self.shared.broadcast(PresenceEvent::Leave {
                key: self.key.clone(),
                payload,
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.untrack().await?;
        self.subscribed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn events(&self) -> mpsc::UnboundedReceiver<PresenceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.listeners.lock().push(tx);
        rx
    }
}

impl PresenceHub for MemoryBackend {
    fn channel(&self, name: &str, key: &str) -> Arc<dyn PresenceChannel> {
        let shared = self
            .presence_channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SharedPresence::new(name)))
            .clone();
        Arc::new(MemoryPresenceChannel {
            key: key.to_string(),
            shared,
            subscribed: AtomicBool::new(false),
        })
    }
}
