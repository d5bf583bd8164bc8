//! Chat message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in a chat channel
///
/// Field names follow the Discord message object so REST responses and
/// gateway `MESSAGE_CREATE` payloads decode directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl ChatMessage {
    /// Age of the message relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}
