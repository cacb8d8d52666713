//! Conversation store - authoritative in-session list of conversations

use crate::error::ChatError;
use crate::models::{Conversation, Message, Participant, DELETED_PLACEHOLDER};
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uplift_backend::{
    Attachment, ChatBackend, ConversationRow, DeliveryStatus, MessageRow, NotificationRow,
    Notifier, ReplyRef, SyncConfig,
};
use uuid::Uuid;

/// In-memory, authoritative-for-the-session list of the current user's
/// conversations, plus every messaging operation against it.
///
/// The list is only mutated from the owning session's event handlers; the
/// `RwLock` exists so the UI thread can take cheap read snapshots.
pub struct ConversationStore {
    backend: Arc<dyn ChatBackend>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    conversations: RwLock<Vec<Conversation>>,
    loading: Arc<AtomicBool>,
    // Bumped for every admitted load and every failsafe firing; a load whose
    // epoch is no longer current has been superseded and its result is dropped.
    load_epoch: Arc<AtomicU64>,
    failsafe: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationStore {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            backend,
            notifier,
            config,
            conversations: RwLock::new(Vec::new()),
            loading: Arc::new(AtomicBool::new(false)),
            load_epoch: Arc::new(AtomicU64::new(0)),
            failsafe: Mutex::new(None),
        }
    }

    /// Current conversation list, sorted by `updated_at` descending
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.conversations.read().clone()
    }

    /// Full reload: four batched reads joined in memory, O(1) round-trips
    /// for any number of conversations.
    ///
    /// Single-flight: a call while another load is in flight is ignored,
    /// since overlapping loads can interleave and let stale data win. Any
    /// read error aborts the whole load with no partial mutation; the
    /// caller sees an unchanged view.
    pub async fn load_conversations(&self, user_id: &str) {
        if self.loading.swap(true, Ordering::SeqCst) {
            debug!("conversation load already in flight, skipping");
            return;
        }
        let epoch = self.load_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.arm_failsafe();

        let fetched = self.fetch_snapshot(user_id).await;

        // A failsafe may have retired this load while it was fetching. Its
        // result must not replace a fresher snapshot, and the in-flight flag
        // now belongs to whichever load took over.
        if self.load_epoch.load(Ordering::SeqCst) != epoch {
            warn!("discarding a conversation load superseded while in flight");
            return;
        }

        match fetched {
            Ok(list) => {
                debug!("loaded {} conversations for {}", list.len(), user_id);
                *self.conversations.write() = list;
            }
            Err(e) => warn!("conversation load finished with no changes: {:#}", e),
        }

        self.disarm_failsafe();
        self.loading.store(false, Ordering::SeqCst);
    }

    /// Cheap path for a single-row change event: refresh only one
    /// conversation's preview, unread count and freshness, then re-sort.
    /// An unknown conversation falls back to a full reload rather than
    /// guessing.
    pub async fn update_single_conversation(&self, conversation_id: &str, user_id: &str) {
        let known = self
            .conversations
            .read()
            .iter()
            .any(|c| c.id == conversation_id);
        if !known {
            debug!(
                "conversation {} not cached locally, running a full reload",
                conversation_id
            );
            self.load_conversations(user_id).await;
            return;
        }

        match self.fetch_single(conversation_id, user_id).await {
            Ok(Some((updated_at, last_message, unread_count))) => {
                let mut list = self.conversations.write();
                if let Some(conv) = list.iter_mut().find(|c| c.id == conversation_id) {
                    conv.updated_at = updated_at;
                    conv.last_message = last_message;
                    conv.unread_count = unread_count;
                }
                // Freshness can change the conversation's rank
                Self::sort_by_freshness(&mut list);
            }
            Ok(None) => {
                // The row vanished remotely; reconcile everything
                self.load_conversations(user_id).await;
            }
            Err(e) => warn!("single conversation update failed: {:#}", e),
        }
    }

    /// Existing conversation for the pair, or a new one created through the
    /// conflict-safe backend path. Re-contact after a one-sided soft delete
    /// resurrects the same row.
    pub async fn get_or_create_conversation(
        &self,
        user_id: &str,
        other_id: &str,
    ) -> Result<Conversation, ChatError> {
        let row = match self
            .backend
            .find_pair_conversation(user_id, other_id)
            .await
            .context("failed to search for an existing conversation")?
        {
            Some(row) => {
                if row.deleted_by.iter().any(|u| u == user_id) {
                    self.backend
                        .unhide_conversation(&row.id, user_id)
                        .await
                        .context("failed to restore a hidden conversation")?;
                }
                row
            }
            None => self
                .backend
                .create_conversation(user_id, other_id)
                .await
                .context("failed to create a conversation")?,
        };

        let conversation = self
            .hydrate(row, user_id)
            .await
            .context("failed to hydrate the conversation")?;

        // Make it visible locally right away
        {
            let mut list = self.conversations.write();
            if let Some(existing) = list.iter_mut().find(|c| c.id == conversation.id) {
                *existing = conversation.clone();
            } else {
                list.push(conversation.clone());
            }
            Self::sort_by_freshness(&mut list);
        }

        Ok(conversation)
    }

    /// Persist an outgoing message, bump the conversation's freshness and
    /// fire the notification side effects (push immediately, email spawned
    /// best-effort). Returns the message as the caller should render it.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        reply_to: Option<ReplyRef>,
        attachments: Vec<Attachment>,
    ) -> Result<Message, ChatError> {
        let conversation = self
            .backend
            .conversation_by_id(conversation_id)
            .await
            .context("failed to read the conversation")?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;

        let now = Utc::now();
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            reply_to,
            attachments,
            read: false,
            status: DeliveryStatus::Sent,
            created_at: now,
            deleted_at: None,
        };

        self.backend
            .insert_message(row.clone())
            .await
            .context("failed to persist the message")?;
        self.backend
            .touch_conversation(conversation_id, now)
            .await
            .context("failed to bump the conversation")?;

        self.notify_recipient(&conversation, &row, sender_id).await;

        Ok(Message::from_row(row))
    }

    /// Soft-delete a message. Only the sender may delete, and only within
    /// the retention window; violations name the rule that was broken.
    pub async fn delete_message(&self, message_id: &str, caller_id: &str) -> Result<(), ChatError> {
        let row = self
            .backend
            .message_by_id(message_id)
            .await
            .context("failed to read the message")?
            .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;

        if row.sender_id != caller_id {
            return Err(ChatError::NotMessageSender);
        }
        let window = ChronoDuration::seconds(self.config.delete_window_secs as i64);
        if Utc::now() - row.created_at > window {
            return Err(ChatError::DeleteWindowExpired {
                window_minutes: window.num_minutes(),
            });
        }

        self.backend
            .soft_delete_message(message_id, Utc::now(), DELETED_PLACEHOLDER)
            .await
            .context("failed to soft-delete the message")?;

        // Realtime payloads for this table can be partial, so the cached
        // preview is patched optimistically instead of waiting for a refresh.
        let mut list = self.conversations.write();
        if let Some(conv) = list.iter_mut().find(|c| c.id == row.conversation_id) {
            if let Some(last) = conv.last_message.as_mut() {
                if last.id == row.id {
                    last.text = DELETED_PLACEHOLDER.to_string();
                    last.deleted = true;
                }
            }
        }

        Ok(())
    }

    /// Bulk-flip `read = true, status = read` for every message in the
    /// conversation not authored by the caller.
    pub async fn mark_as_read(&self, conversation_id: &str, caller_id: &str) -> Result<(), ChatError> {
        self.backend
            .mark_conversation_read(conversation_id, caller_id)
            .await
            .context("failed to mark the conversation as read")?;

        let mut list = self.conversations.write();
        if let Some(conv) = list.iter_mut().find(|c| c.id == conversation_id) {
            conv.unread_count = 0;
            if let Some(last) = conv.last_message.as_mut() {
                if last.sender_id != caller_id {
                    last.read = true;
                    last.status = last.status.advance_to(DeliveryStatus::Read);
                }
            }
        }

        Ok(())
    }

    /// Hide the conversation for the caller. The local list is updated
    /// optimistically before the server round-trip; the row persists for
    /// the other participant.
    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        caller_id: &str,
    ) -> Result<(), ChatError> {
        self.conversations
            .write()
            .retain(|c| c.id != conversation_id);

        self.backend
            .hide_conversation(conversation_id, caller_id)
            .await
            .context("failed to hide the conversation")?;

        Ok(())
    }

    async fn fetch_snapshot(&self, user_id: &str) -> anyhow::Result<Vec<Conversation>> {
        let rows = self
            .backend
            .conversations_for_user(user_id)
            .await
            .context("failed to read conversations")?;

        let conversation_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let participant_ids: BTreeSet<String> = rows
            .iter()
            .flat_map(|r| r.participants.iter().cloned())
            .collect();
        let participant_ids: Vec<String> = participant_ids.into_iter().collect();

        let users = self
            .backend
            .users_by_ids(&participant_ids)
            .await
            .context("failed to read participant profiles")?;
        let mut latest = self
            .backend
            .latest_messages(&conversation_ids)
            .await
            .context("failed to read last messages")?;
        let mut unread = self
            .backend
            .unread_counts(&conversation_ids, user_id)
            .await
            .context("failed to read unread counts")?;

        let mut list: Vec<Conversation> = rows
            .into_iter()
            .map(|row| {
                let participant_details: Vec<Participant> = row
                    .participants
                    .iter()
                    .filter_map(|p| users.iter().find(|u| &u.id == p))
                    .cloned()
                    .map(Participant::from)
                    .collect();
                let last_message = latest.remove(&row.id).map(Message::from_row);
                let unread_count = unread.remove(&row.id).unwrap_or(0);
                Conversation {
                    id: row.id,
                    participants: row.participants,
                    participant_details,
                    last_message,
                    unread_count,
                    updated_at: row.updated_at,
                }
            })
            .collect();

        Self::sort_by_freshness(&mut list);
        Ok(list)
    }

    async fn fetch_single(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> anyhow::Result<Option<(DateTime<Utc>, Option<Message>, u32)>> {
        let Some(row) = self
            .backend
            .conversation_by_id(conversation_id)
            .await
            .context("failed to read the conversation")?
        else {
            return Ok(None);
        };

        let ids = vec![conversation_id.to_string()];
        let mut latest = self
            .backend
            .latest_messages(&ids)
            .await
            .context("failed to read the last message")?;
        let mut unread = self
            .backend
            .unread_counts(&ids, user_id)
            .await
            .context("failed to read the unread count")?;

        Ok(Some((
            row.updated_at,
            latest.remove(conversation_id).map(Message::from_row),
            unread.remove(conversation_id).unwrap_or(0),
        )))
    }

    async fn hydrate(
        &self,
        row: ConversationRow,
        user_id: &str,
    ) -> anyhow::Result<Conversation> {
        let participant_ids: Vec<String> = row.participants.to_vec();
        let users = self.backend.users_by_ids(&participant_ids).await?;
        let ids = vec![row.id.clone()];
        let mut latest = self.backend.latest_messages(&ids).await?;
        let mut unread = self.backend.unread_counts(&ids, user_id).await?;

        let participant_details = users.into_iter().map(Participant::from).collect();
        let last_message = latest.remove(&row.id).map(Message::from_row);
        let unread_count = unread.remove(&row.id).unwrap_or(0);

        Ok(Conversation {
            id: row.id,
            participants: row.participants,
            participant_details,
            last_message,
            unread_count,
            updated_at: row.updated_at,
        })
    }

    async fn notify_recipient(
        &self,
        conversation: &ConversationRow,
        row: &MessageRow,
        sender_id: &str,
    ) {
        let Some(recipient) = conversation.other_participant(sender_id) else {
            return;
        };

        match self.backend.notification_pref(recipient).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("message notifications disabled for {}", recipient);
                return;
            }
            Err(e) => {
                warn!("failed to read notification preference: {:#}", e);
                return;
            }
        }

        let sender_name = self
            .backend
            .users_by_ids(&[sender_id.to_string()])
            .await
            .ok()
            .and_then(|users| users.into_iter().next())
            .map(|u| u.name)
            .unwrap_or_else(|| sender_id.to_string());

        let body = if row.text.is_empty() && !row.attachments.is_empty() {
            "Sent an attachment".to_string()
        } else {
            row.text.clone()
        };
        let notification = NotificationRow {
            id: Uuid::new_v4().to_string(),
            user_id: recipient.to_string(),
            kind: "message".to_string(),
            reference_id: row.conversation_id.clone(),
            title: format!("New message from {}", sender_name),
            body,
            created_at: Utc::now(),
        };

        if let Err(e) = self.backend.insert_notification(notification.clone()).await {
            warn!("failed to persist the notification: {:#}", e);
        }
        if let Err(e) = self.notifier.push(recipient, &notification).await {
            warn!("push notification failed: {:#}", e);
        }

        // Email is best-effort and must never block the send path
        let notifier = self.notifier.clone();
        let recipient = recipient.to_string();
        let subject = notification.title.clone();
        let body = notification.body.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.email(&recipient, &subject, &body).await {
                debug!("notification email failed: {:#}", e);
            }
        });
    }

    /// Re-arm the failsafe that force-clears a stuck in-flight flag, so a
    /// load that never reaches its terminal block cannot lock the UI out
    /// permanently.
    fn arm_failsafe(&self) {
        let loading = self.loading.clone();
        let load_epoch = self.load_epoch.clone();
        let secs = self.config.load_failsafe_secs;
        let mut slot = self.failsafe.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if loading.swap(false, Ordering::SeqCst) {
                // Retire the stuck load's epoch so its late completion is
                // discarded instead of racing the next load.
                load_epoch.fetch_add(1, Ordering::SeqCst);
                warn!("force-cleared a stuck conversation load after {}s", secs);
            }
        }));
    }

    fn disarm_failsafe(&self) {
        if let Some(handle) = self.failsafe.lock().take() {
            handle.abort();
        }
    }

    fn sort_by_freshness(list: &mut [Conversation]) {
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
}
