// Tests for message deletion policy and notification side effects.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uplift_backend::{
    ChatBackend, DeliveryStatus, MemoryBackend, MessageRow, RecordingNotifier, SyncConfig,
    UserRow,
};
use uplift_chat::{ChatError, ConversationStore, DELETED_PLACEHOLDER};
use uuid::Uuid;

#[tokio::test]
async fn sender_can_delete_inside_the_retention_window() {
    let (backend, store) = setup();
    let conv = backend.create_conversation("alice", "bob").await.unwrap();

    let row = backdated_message(&conv.id, "alice", "oops", Duration::minutes(59));
    backend.insert_message(row.clone()).await.unwrap();

    store
        .delete_message(&row.id, "alice")
        .await
        .expect("A 59-minute-old message must be deletable by its sender");

    let stored = backend.message_by_id(&row.id).await.unwrap().unwrap();
    assert!(stored.deleted_at.is_some());
    assert_eq!(stored.text, DELETED_PLACEHOLDER);
}

#[tokio::test]
async fn delete_past_the_window_is_rejected() {
    let (backend, store) = setup();
    let conv = backend.create_conversation("alice", "bob").await.unwrap();

    let row = backdated_message(&conv.id, "alice", "too late", Duration::minutes(61));
    backend.insert_message(row.clone()).await.unwrap();

    let err = store.delete_message(&row.id, "alice").await.unwrap_err();
    assert!(
        matches!(err, ChatError::DeleteWindowExpired { window_minutes: 60 }),
        "Expected a window violation, got {err}"
    );

    let stored = backend.message_by_id(&row.id).await.unwrap().unwrap();
    assert!(stored.deleted_at.is_none(), "The row must stay untouched");
}

#[tokio::test]
async fn non_sender_can_never_delete() {
    let (backend, store) = setup();
    let conv = backend.create_conversation("alice", "bob").await.unwrap();

    let row = backdated_message(&conv.id, "alice", "fresh", Duration::minutes(1));
    backend.insert_message(row.clone()).await.unwrap();

    let err = store.delete_message(&row.id, "bob").await.unwrap_err();
    assert!(matches!(err, ChatError::NotMessageSender));
}

#[tokio::test]
async fn deleting_the_last_message_patches_the_cached_preview() {
    let (_backend, store) = setup();
    let conv = store
        .get_or_create_conversation("alice", "bob")
        .await
        .unwrap();

    let sent = store
        .send_message(&conv.id, "alice", "about to vanish", None, Vec::new())
        .await
        .unwrap();
    store.load_conversations("alice").await;

    store.delete_message(&sent.id, "alice").await.unwrap();

    let snapshot = store.snapshot();
    let preview = snapshot[0].last_message.as_ref().unwrap();
    assert_eq!(preview.text, DELETED_PLACEHOLDER);
    assert!(preview.deleted);
}

#[tokio::test]
async fn notifications_respect_the_recipient_preference() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_user(user("alice", "Alice", true));
    let mut bob = user("bob", "Bob", true);
    bob.message_notifications = false;
    backend.insert_user(bob);

    let notifier = Arc::new(RecordingNotifier::new());
    let store = Arc::new(ConversationStore::new(
        backend.clone(),
        notifier.clone(),
        SyncConfig::default(),
    ));
    let conv = store
        .get_or_create_conversation("alice", "bob")
        .await
        .unwrap();

    // Bob has notifications off: nothing is written or pushed
    store
        .send_message(&conv.id, "alice", "quiet", None, Vec::new())
        .await
        .unwrap();
    assert!(backend.notifications().is_empty());
    assert!(notifier.pushes().is_empty());

    // Alice has them on: bob's reply lands as a push and an email
    store
        .send_message(&conv.id, "bob", "loud", None, Vec::new())
        .await
        .unwrap();
    tokio::task::yield_now().await;

    let pushes = notifier.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].0, "alice");
    assert_eq!(pushes[0].1.title, "New message from Bob");

    let notifications = backend.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, "alice");
}

// Test fixtures

fn setup() -> (Arc<MemoryBackend>, Arc<ConversationStore>) {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_user(user("alice", "Alice", true));
    backend.insert_user(user("bob", "Bob", true));
    let store = Arc::new(ConversationStore::new(
        backend.clone(),
        Arc::new(RecordingNotifier::new()),
        SyncConfig::default(),
    ));
    (backend, store)
}

fn user(id: &str, name: &str, notifications: bool) -> UserRow {
    UserRow {
        id: id.to_string(),
        name: name.to_string(),
        avatar_url: None,
        role: "volunteer".to_string(),
        online_status: false,
        last_seen: None,
        message_notifications: notifications,
    }
}

fn backdated_message(
    conversation_id: &str,
    sender_id: &str,
    text: &str,
    age: Duration,
) -> MessageRow {
    MessageRow {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        text: text.to_string(),
        reply_to: None,
        attachments: Vec::new(),
        read: false,
        status: DeliveryStatus::Sent,
        created_at: Utc::now() - age,
        deleted_at: None,
    }
}
