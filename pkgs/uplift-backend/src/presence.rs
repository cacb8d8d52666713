//! Ephemeral presence protocol types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Presence record tracked per channel membership, never persisted
///
/// `timestamp` is the epoch of the payload; it makes last-writer-wins
/// well-defined when join/leave deltas arrive out of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user_id: String,
    pub user_name: String,
    pub online: bool,
    pub timestamp: DateTime<Utc>,
}

impl PresencePayload {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>, online: bool) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            online,
            timestamp: Utc::now(),
        }
    }
}

/// Presence event delivered on a channel
///
/// `Sync` is an authoritative snapshot of the full channel state and always
/// replaces any delta applied before it; `Join`/`Leave` are deltas on top.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Sync(HashMap<String, PresencePayload>),
    Join {
        key: String,
        payload: PresencePayload,
    },
    Leave {
        key: String,
        payload: PresencePayload,
    },
}

/// Terminal status reported by a channel subscription
///
/// Tracking a presence payload is only valid once `Subscribed` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    TimedOut,
    Closed,
    ChannelError,
}
