//! Row-store contract consumed by the messaging core

use crate::types::{ConversationRow, MessageRow, NotificationRow, UserRow};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// The narrow CRUD contract the core assumes from the hosted row store.
///
/// All reads the conversation loader issues are batched: for C conversations
/// the full reload is O(1) round-trips, not O(C).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// All conversations containing `user_id` and not soft-deleted by them
    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>>;

    /// Batched profile read for all distinct participants
    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>>;

    /// Most recent non-deleted message per conversation, in one call
    async fn latest_messages(
        &self,
        conversation_ids: &[String],
    ) -> Result<HashMap<String, MessageRow>>;

    /// Unread counts per conversation for `user_id`, in one call
    ///
    /// A message counts as unread when it was authored by the other
    /// participant, is not soft-deleted, and has `read = false`.
    async fn unread_counts(
        &self,
        conversation_ids: &[String],
        user_id: &str,
    ) -> Result<HashMap<String, u32>>;

    async fn conversation_by_id(&self, id: &str) -> Result<Option<ConversationRow>>;

    /// Existing conversation for the unordered pair, hidden or not
    async fn find_pair_conversation(&self, a: &str, b: &str) -> Result<Option<ConversationRow>>;

    /// Insert-or-fetch for the unordered pair.
    ///
    /// Relies on the storage-level uniqueness of the sorted participant pair:
    /// a conflicting insert returns the existing row instead of failing. When
    /// the existing row was hidden by `caller_id`, their soft-delete flag is
    /// cleared (re-contact resurrects the row).
    async fn create_conversation(&self, caller_id: &str, other_id: &str)
        -> Result<ConversationRow>;

    async fn insert_message(&self, row: MessageRow) -> Result<()>;

    async fn message_by_id(&self, id: &str) -> Result<Option<MessageRow>>;

    /// Soft-delete: set `deleted_at` and replace the text with `placeholder`
    async fn soft_delete_message(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        placeholder: &str,
    ) -> Result<()>;

    /// Bulk-flip `read = true, status = read` for every message in the
    /// conversation not authored by `reader_id`
    async fn mark_conversation_read(&self, conversation_id: &str, reader_id: &str) -> Result<()>;

    /// Append `user_id` to the conversation's soft-delete set
    async fn hide_conversation(&self, conversation_id: &str, user_id: &str) -> Result<()>;

    /// Clear `user_id` from the conversation's soft-delete set
    async fn unhide_conversation(&self, conversation_id: &str, user_id: &str) -> Result<()>;

    /// Bump the conversation's `updated_at` marker
    async fn touch_conversation(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Best-effort persisted presence fallback on the profile row
    async fn set_online_status(
        &self,
        user_id: &str,
        online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<()>;

    /// Whether `user_id` has message notifications enabled
    async fn notification_pref(&self, user_id: &str) -> Result<bool>;

    async fn insert_notification(&self, row: NotificationRow) -> Result<()>;
}
