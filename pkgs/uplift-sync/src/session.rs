//! Per-user session lifecycle.

use crate::scheduler::ReloadScheduler;
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uplift_backend::{ChatBackend, Notifier, PresenceHub, Realtime, SyncConfig};
use uplift_chat::ConversationStore;
use uplift_presence::{AppState, ConversationPresence, LifecycleCoordinator, PresenceTracker};

struct ActiveSession {
    user_id: String,
    scheduler: Arc<ReloadScheduler>,
    tracker: Arc<PresenceTracker>,
    lifecycle: LifecycleCoordinator,
    conversations: ConversationPresence,
    pumps: Vec<JoinHandle<()>>,
}

/// Owns everything that lives for the duration of one signed-in session:
/// change-feed pumps, the reload scheduler, and both presence trackers.
///
/// `start` is idempotent per user; starting for a different user tears the
/// previous session down first. All state is scoped to the session, so
/// sign-out leaves nothing behind.
pub struct SessionController {
    backend: Arc<dyn ChatBackend>,
    realtime: Arc<dyn Realtime>,
    hub: Arc<dyn PresenceHub>,
    config: SyncConfig,
    store: Arc<ConversationStore>,
    session: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        realtime: Arc<dyn Realtime>,
        hub: Arc<dyn PresenceHub>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        let store = Arc::new(ConversationStore::new(
            Arc::clone(&backend),
            notifier,
            config.clone(),
        ));
        Self {
            backend,
            realtime,
            hub,
            config,
            store,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// The conversation store backing this session
    pub fn store(&self) -> Arc<ConversationStore> {
        Arc::clone(&self.store)
    }

    /// Bring a session up for `user_id`: fetch the profile, load the
    /// conversation list, attach the change feeds and announce presence.
    ///
    /// A missing or slow profile degrades to the user id as display name
    /// rather than blocking sign-in.
    pub async fn start(&self, user_id: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(active) = session.as_ref() {
            if active.user_id == user_id {
                return Ok(());
            }
            let previous = session.take();
            if let Some(previous) = previous {
                Self::teardown(previous).await;
            }
        }

        let user_name = self.fetch_display_name(user_id).await;
        info!(user_id, "starting messaging session");

        self.store.load_conversations(user_id).await;

        let scheduler = Arc::new(ReloadScheduler::new(
            self.store(),
            user_id,
            &self.config,
        ));
        let pumps = vec![
            self.pump_messages(Arc::clone(&scheduler)),
            self.pump_conversations(Arc::clone(&scheduler)),
        ];

        let tracker = Arc::new(PresenceTracker::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.hub),
            self.config.clone(),
            user_id,
            &user_name,
        ));
        if let Err(e) = tracker.go_online().await {
            warn!(user_id, "presence unavailable at session start: {e:#}");
        }
        let lifecycle = LifecycleCoordinator::new(Arc::clone(&tracker));
        let conversations =
            ConversationPresence::new(Arc::clone(&self.hub), user_id, &user_name);

        *session = Some(ActiveSession {
            user_id: user_id.to_string(),
            scheduler,
            tracker,
            lifecycle,
            conversations,
            pumps,
        });
        Ok(())
    }

    /// Tear the session down and broadcast the offline transition
    pub async fn stop(&self) {
        let active = self.session.lock().await.take();
        if let Some(active) = active {
            info!(user_id = %active.user_id, "stopping messaging session");
            Self::teardown(active).await;
        }
    }

    pub async fn on_app_state(&self, state: AppState) {
        let session = self.session.lock().await;
        if let Some(active) = session.as_ref() {
            active.lifecycle.on_app_state(state).await;
        }
    }

    /// Whether `user_id` is on the global presence channel right now
    pub async fn is_online(&self, user_id: &str) -> bool {
        let session = self.session.lock().await;
        session
            .as_ref()
            .map(|active| active.tracker.is_online(user_id))
            .unwrap_or(false)
    }

    pub async fn join_conversation(&self, conversation_id: &str) -> Result<()> {
        let session = self.session.lock().await;
        let Some(active) = session.as_ref() else {
            bail!("no active session");
        };
        active.conversations.join(conversation_id).await?;
        Ok(())
    }

    pub async fn set_conversation_active(&self, conversation_id: &str, active: bool) -> Result<()> {
        let session = self.session.lock().await;
        let Some(current) = session.as_ref() else {
            bail!("no active session");
        };
        current.conversations.set_active(conversation_id, active).await?;
        Ok(())
    }

    pub async fn peer_active(&self, conversation_id: &str, peer_id: &str) -> bool {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(active) => active.conversations.peer_active(conversation_id, peer_id).await,
            None => false,
        }
    }

    async fn fetch_display_name(&self, user_id: &str) -> String {
        let timeout = Duration::from_secs(self.config.profile_timeout_secs);
        let ids = [user_id.to_string()];
        let lookup = self.backend.users_by_ids(&ids);
        match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(users)) => match users.into_iter().next() {
                Some(user) => user.name,
                None => {
                    warn!(user_id, "profile row missing, using id as display name");
                    user_id.to_string()
                }
            },
            Ok(Err(e)) => {
                warn!(user_id, "profile fetch failed, using id as display name: {e:#}");
                user_id.to_string()
            }
            Err(_) => {
                warn!(user_id, "profile fetch timed out, using id as display name");
                user_id.to_string()
            }
        }
    }

    fn pump_messages(&self, scheduler: Arc<ReloadScheduler>) -> JoinHandle<()> {
        let mut changes = self.realtime.message_changes();
        tokio::spawn(async move {
            while let Some(event) = changes.recv().await {
                scheduler.handle_message_event(event);
            }
        })
    }

    fn pump_conversations(&self, scheduler: Arc<ReloadScheduler>) -> JoinHandle<()> {
        let mut changes = self.realtime.conversation_changes();
        tokio::spawn(async move {
            while let Some(event) = changes.recv().await {
                scheduler.handle_conversation_event(event);
            }
        })
    }

    async fn teardown(active: ActiveSession) {
        for pump in &active.pumps {
            pump.abort();
        }
        active.scheduler.stop();
        active.conversations.stop().await;
        active.tracker.stop().await;
    }
}
