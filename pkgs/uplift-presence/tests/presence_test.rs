// Tests for global presence, stale-delta handling, debounced offline and
// per-conversation activity.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uplift_backend::{
    ChannelStatus, MemoryBackend, PresenceChannel, PresenceEvent, PresenceHub, PresencePayload,
    SyncConfig, UserRow,
};
use uplift_presence::{
    apply_presence_event, AppState, ChannelState, ConversationPresence, LifecycleCoordinator,
    PresenceTracker,
};

#[tokio::test]
async fn going_online_subscribes_then_tracks() {
    let (backend, tracker) = setup("alice", "Alice");

    tracker.go_online().await.expect("Failed to go online");
    settle().await;

    assert_eq!(tracker.state(), ChannelState::Subscribed);
    assert!(tracker.is_online("alice"), "Own join must be reflected");
    assert!(
        backend.user("alice").unwrap().online_status,
        "Persisted fallback flag must be set"
    );
}

#[tokio::test]
async fn peers_see_each_other_through_the_global_channel() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_user(user("alice", "Alice"));
    backend.insert_user(user("bob", "Bob"));

    let alice = tracker_for(&backend, "alice", "Alice");
    let bob = tracker_for(&backend, "bob", "Bob");

    alice.go_online().await.expect("Failed to go online");
    settle().await;
    // Bob joins later and learns about alice from the sync snapshot
    bob.go_online().await.expect("Failed to go online");
    settle().await;

    assert!(bob.is_online("alice"));
    assert!(alice.is_online("bob"), "Join delta reached the earlier member");

    alice.stop().await;
    settle().await;
    assert!(!bob.is_online("alice"), "Leave must remove the member");
}

#[test]
fn sync_snapshot_replaces_local_state_and_filters_offline() {
    let mut members = HashMap::new();
    members.insert("ghost".to_string(), payload("ghost", true, 0));

    let mut snapshot = HashMap::new();
    snapshot.insert("alice".to_string(), payload("alice", true, 0));
    snapshot.insert("bob".to_string(), payload("bob", false, 0));
    apply_presence_event(&mut members, PresenceEvent::Sync(snapshot), true);

    assert!(members.contains_key("alice"));
    assert!(!members.contains_key("bob"), "Offline members are dropped");
    assert!(!members.contains_key("ghost"), "Snapshot is authoritative");
}

#[test]
fn stale_leave_never_knocks_out_a_fresh_join() {
    let mut members = HashMap::new();
    apply_presence_event(
        &mut members,
        PresenceEvent::Join {
            key: "alice".to_string(),
            payload: payload("alice", true, 10),
        },
        true,
    );

    // Leave from a previous connection, older than the tracked join
    apply_presence_event(
        &mut members,
        PresenceEvent::Leave {
            key: "alice".to_string(),
            payload: payload("alice", true, 5),
        },
        true,
    );
    assert!(members.contains_key("alice"), "Stale leave must be ignored");

    // A genuinely newer leave still wins
    apply_presence_event(
        &mut members,
        PresenceEvent::Leave {
            key: "alice".to_string(),
            payload: payload("alice", true, 15),
        },
        true,
    );
    assert!(!members.contains_key("alice"));
}

#[tokio::test(start_paused = true)]
async fn offline_is_debounced_and_cancelled_by_foreground() {
    let (backend, tracker) = setup("alice", "Alice");
    tracker.go_online().await.expect("Failed to go online");
    settle().await;

    // A brief background flicker never reaches the channel
    tracker.mark_offline();
    tracker.go_online().await.expect("Failed to go online");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(tracker.is_online("alice"));
    assert!(backend.user("alice").unwrap().online_status);

    // An uninterrupted grace window does
    tracker.mark_offline();
    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    assert!(!tracker.is_online("alice"));
    let row = backend.user("alice").unwrap();
    assert!(!row.online_status);
    assert!(row.last_seen.is_some(), "last_seen must be stamped");
}

#[tokio::test(start_paused = true)]
async fn lifecycle_coordinator_maps_app_states() {
    let (backend, tracker) = setup("alice", "Alice");
    let lifecycle = LifecycleCoordinator::new(tracker.clone());

    lifecycle.on_app_state(AppState::Foreground).await;
    settle().await;
    assert!(tracker.is_online("alice"));

    lifecycle.on_app_state(AppState::Background).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    assert!(!tracker.is_online("alice"));
    assert!(!backend.user("alice").unwrap().online_status);
}

#[tokio::test]
async fn conversation_activity_is_visible_to_peers() {
    let backend = Arc::new(MemoryBackend::new());
    let alice = ConversationPresence::new(backend.clone(), "alice", "Alice");
    let bob = ConversationPresence::new(backend.clone(), "bob", "Bob");

    alice.join("c1").await.expect("Failed to join channel");
    alice.join("c1").await.expect("Joining twice must be a no-op");
    bob.join("c1").await.expect("Failed to join channel");
    settle().await;

    // Joined but not looking at it
    assert!(!bob.peer_active("c1", "alice").await);

    alice.set_active("c1", true).await.expect("Failed to track");
    settle().await;
    assert!(bob.peer_active("c1", "alice").await);

    alice.set_active("c1", false).await.expect("Failed to track");
    settle().await;
    assert!(!bob.peer_active("c1", "alice").await);

    alice.leave("c1").await;
    settle().await;
    assert!(!bob.peer_active("c1", "alice").await);
}

#[tokio::test]
async fn failed_first_track_leaves_a_retryable_subscription() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_user(user("alice", "Alice"));
    let hub = Arc::new(FlakyHub {
        backend: backend.clone(),
        fail_next: Arc::new(AtomicBool::new(true)),
    });
    let tracker = Arc::new(PresenceTracker::new(
        backend.clone(),
        hub,
        SyncConfig::default(),
        "alice",
        "Alice",
    ));

    tracker
        .go_online()
        .await
        .expect_err("The first track attempt must surface the failure");
    assert_eq!(tracker.state(), ChannelState::Subscribed);
    assert!(!tracker.is_online("alice"));

    // The retry takes the already-subscribed path and must reach the channel
    tracker.go_online().await.expect("Failed to go online");
    settle().await;
    assert!(tracker.is_online("alice"));
}

#[tokio::test]
async fn set_active_requires_a_joined_channel() {
    let backend = Arc::new(MemoryBackend::new());
    let presence = ConversationPresence::new(backend, "alice", "Alice");

    let err = presence.set_active("nope", true).await.unwrap_err();
    assert!(err.to_string().contains("not joined"));
}

// Test fixtures

fn setup(id: &str, name: &str) -> (Arc<MemoryBackend>, Arc<PresenceTracker>) {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_user(user(id, name));
    let tracker = tracker_for(&backend, id, name);
    (backend, tracker)
}

fn tracker_for(backend: &Arc<MemoryBackend>, id: &str, name: &str) -> Arc<PresenceTracker> {
    let config = SyncConfig {
        offline_grace_ms: 50,
        ..SyncConfig::default()
    };
    Arc::new(PresenceTracker::new(
        backend.clone(),
        backend.clone(),
        config,
        id,
        name,
    ))
}

fn user(id: &str, name: &str) -> UserRow {
    UserRow {
        id: id.to_string(),
        name: name.to_string(),
        avatar_url: None,
        role: "volunteer".to_string(),
        online_status: false,
        last_seen: None,
        message_notifications: true,
    }
}

fn payload(user_id: &str, online: bool, offset_secs: i64) -> PresencePayload {
    PresencePayload {
        user_id: user_id.to_string(),
        user_name: user_id.to_string(),
        online,
        timestamp: Utc::now() + ChronoDuration::seconds(offset_secs),
    }
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// Hub whose channels fail their next track attempt, wrapping the in-memory one

struct FlakyHub {
    backend: Arc<MemoryBackend>,
    fail_next: Arc<AtomicBool>,
}

impl PresenceHub for FlakyHub {
    fn channel(&self, name: &str, key: &str) -> Arc<dyn PresenceChannel> {
        Arc::new(FlakyTrackChannel {
            inner: self.backend.channel(name, key),
            fail_next: self.fail_next.clone(),
        })
    }
}

struct FlakyTrackChannel {
    inner: Arc<dyn PresenceChannel>,
    fail_next: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl PresenceChannel for FlakyTrackChannel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn subscribe(&self) -> anyhow::Result<ChannelStatus> {
        self.inner.subscribe().await
    }

    async fn track(&self, payload: PresencePayload) -> anyhow::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("transient channel failure");
        }
        self.inner.track(payload).await
    }

    async fn untrack(&self) -> anyhow::Result<()> {
        self.inner.untrack().await
    }

    async fn unsubscribe(&self) -> anyhow::Result<()> {
        self.inner.unsubscribe().await
    }

    fn events(&self) -> tokio::sync::mpsc::UnboundedReceiver<PresenceEvent> {
        self.inner.events()
    }
}
