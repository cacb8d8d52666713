//! Debounced reload scheduling driven by realtime change events.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uplift_backend::{ChangeEvent, SyncConfig};
use uplift_chat::ConversationStore;

/// Decides, per change event, between a cheap single-conversation patch and
/// a debounced full reload.
///
/// Full reloads are trailing-edge debounced: every request resets the
/// timer, so a burst of change events collapses into one batched reload
/// after the window goes quiet.
pub struct ReloadScheduler {
    store: Arc<ConversationStore>,
    user_id: String,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ReloadScheduler {
    pub fn new(store: Arc<ConversationStore>, user_id: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            debounce: Duration::from_millis(config.reload_debounce_ms),
            pending: Mutex::new(None),
        }
    }

    /// Request a full reload after the debounce window; resets any pending one
    pub fn schedule_full_reload(self: &Arc<Self>) {
        let mut slot = self.pending.lock();
        if let Some(pending) = slot.take() {
            pending.abort();
        }
        let scheduler = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(scheduler.debounce).await;
            debug!(user_id = %scheduler.user_id, "debounce window elapsed, reloading");
            scheduler.store.load_conversations(&scheduler.user_id).await;
        }));
    }

    /// Message changes that name their conversation take the immediate
    /// single-conversation path; anything else falls back to a full reload.
    pub fn handle_message_event(self: &Arc<Self>, event: ChangeEvent) {
        match event.conversation_id {
            Some(conversation_id) => {
                let store = Arc::clone(&self.store);
                let user_id = self.user_id.clone();
                tokio::spawn(async move {
                    store.update_single_conversation(&conversation_id, &user_id).await;
                });
            }
            None => self.schedule_full_reload(),
        }
    }

    /// Conversation rows affect ordering and visibility, so they always go
    /// through the debounced full reload.
    pub fn handle_conversation_event(self: &Arc<Self>, _event: ChangeEvent) {
        self.schedule_full_reload();
    }

    pub fn stop(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }
}
