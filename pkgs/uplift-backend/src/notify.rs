//! Notification sink - fire-and-forget push and email delivery

use crate::types::NotificationRow;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

/// Downstream notification delivery.
///
/// Both calls are fire-and-forget from the core's perspective: failures are
/// logged by the caller and never block message send.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, user_id: &str, notification: &NotificationRow) -> Result<()>;

    async fn email(&self, user_id: &str, subject: &str, body: &str) -> Result<()>;
}

/// Notifier that only logs, used by the demo session
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn push(&self, user_id: &str, notification: &NotificationRow) -> Result<()> {
        info!("push to {}: {}", user_id, notification.title);
        Ok(())
    }

    async fn email(&self, user_id: &str, subject: &str, _body: &str) -> Result<()> {
        info!("email to {}: {}", user_id, subject);
        Ok(())
    }
}

/// Notifier that records every delivery, used by tests
#[derive(Default)]
pub struct RecordingNotifier {
    pushes: Mutex<Vec<(String, NotificationRow)>>,
    emails: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushes(&self) -> Vec<(String, NotificationRow)> {
        self.pushes.lock().clone()
    }

    pub fn emails(&self) -> Vec<(String, String)> {
        self.emails.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn push(&self, user_id: &str, notification: &NotificationRow) -> Result<()> {
        self.pushes
            .lock()
            .push((user_id.to_string(), notification.clone()));
        Ok(())
    }

    async fn email(&self, user_id: &str, subject: &str, _body: &str) -> Result<()> {
        self.emails
            .lock()
            .push((user_id.to_string(), subject.to_string()));
        Ok(())
    }
}
