//! Presence error types.

use thiserror::Error;
use uplift_backend::ChannelStatus;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence channel subscription failed: {0:?}")]
    SubscribeFailed(ChannelStatus),

    #[error("not joined to conversation channel: {0}")]
    NotJoined(String),

    #[error("channel error: {0}")]
    Channel(#[from] anyhow::Error),
}
