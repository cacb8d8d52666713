//! App lifecycle to presence mapping.

use crate::tracker::PresenceTracker;
use std::sync::Arc;
use tracing::warn;

/// Host application visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Foreground,
    Background,
    Inactive,
}

/// Maps app state transitions onto the global presence tracker.
///
/// Foreground announces online immediately; background and inactive both
/// arm the debounced offline transition, so switching apps for a moment
/// never broadcasts a leave.
pub struct LifecycleCoordinator {
    tracker: Arc<PresenceTracker>,
}

impl LifecycleCoordinator {
    pub fn new(tracker: Arc<PresenceTracker>) -> Self {
        Self { tracker }
    }

    pub async fn on_app_state(&self, state: AppState) {
        match state {
            AppState::Foreground => {
                if let Err(e) = self.tracker.go_online().await {
                    warn!("failed to go online on foreground: {e:#}");
                }
            }
            AppState::Background | AppState::Inactive => {
                self.tracker.mark_offline();
            }
        }
    }
}
