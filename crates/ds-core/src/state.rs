//! State type as reported by the hub

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_ON};

/// The state of one entity as carried in `get_states` results and
/// `state_changed` events
///
/// Only `entity_id` and `state` are required; the hub always sends the
/// rest, but nothing in the tracker depends on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to
    pub entity_id: EntityId,

    /// The state value (e.g., "on", "off", "unavailable")
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub context: Context,
}

impl State {
    /// Create a bare state with no attributes or timestamps
    pub fn new(entity_id: EntityId, state: impl Into<String>) -> Self {
        Self {
            entity_id,
            state: state.into(),
            attributes: HashMap::new(),
            last_changed: None,
            last_updated: None,
            context: Context::default(),
        }
    }

    /// Whether the state value is exactly "on"
    pub fn is_on(&self) -> bool {
        self.state == STATE_ON
    }

    /// Get the friendly name attribute, if any
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(|v| v.as_str())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are not compared
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
