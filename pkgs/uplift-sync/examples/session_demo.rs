//! End-to-end walkthrough of a messaging session over the in-memory backend.
//!
//! Run with: cargo run -p uplift-sync --example session_demo

use std::sync::Arc;
use std::time::Duration;
use uplift_backend::{LogNotifier, MemoryBackend, SyncConfig, UserRow};
use uplift_presence::AppState;
use uplift_sync::SessionController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let backend = Arc::new(MemoryBackend::new());
    backend.insert_user(profile("alice", "Alice"));
    backend.insert_user(profile("bob", "Bob"));

    let controller = SessionController::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Arc::new(LogNotifier),
        SyncConfig::default(),
    );

    controller.start("alice").await?;
    let store = controller.store();

    let conv = store.get_or_create_conversation("alice", "bob").await?;
    println!("conversation {} with {:?}", conv.id, conv.participants);

    store
        .send_message(&conv.id, "alice", "Hi Bob, are you free on Saturday?", None, Vec::new())
        .await?;
    store
        .send_message(&conv.id, "bob", "Sure, what do you need?", None, Vec::new())
        .await?;

    // Let the change feed and debounce settle
    tokio::time::sleep(Duration::from_millis(500)).await;

    for conversation in store.snapshot() {
        let preview = conversation
            .last_message
            .as_ref()
            .map(|m| m.text.as_str())
            .unwrap_or("<empty>");
        println!(
            "{} | unread {} | {}",
            conversation
                .other_participant("alice")
                .map(|p| p.name.as_str())
                .unwrap_or("?"),
            conversation.unread_count,
            preview
        );
    }

    println!("bob online: {}", controller.is_online("bob").await);

    controller.on_app_state(AppState::Background).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    controller.on_app_state(AppState::Foreground).await;

    controller.stop().await;
    Ok(())
}

fn profile(id: &str, name: &str) -> UserRow {
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
