//! Core types for door-sentry
//!
//! This crate provides the types decoded from the Home Assistant websocket
//! feed: EntityId, State, Event and Context, plus the `state_changed`
//! payload the sensor tracker consumes.

mod context;
mod entity_id;
mod event;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventType};
pub use state::State;

/// State value reported by a binary sensor that is active (door open)
pub const STATE_ON: &str = "on";

/// State value reported by a binary sensor that is inactive (door closed)
pub const STATE_OFF: &str = "off";

/// Standard event types emitted by the hub
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Data for STATE_CHANGED events
    ///
    /// Either side may be null on the wire: `old_state` when an entity is
    /// first added, `new_state` when it is removed.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        #[serde(default)]
        pub old_state: Option<State>,
        #[serde(default)]
        pub new_state: Option<State>,
    }

    impl StateChangedData {
        /// The new state value, if the entity still exists
        pub fn new_state_value(&self) -> Option<&str> {
            self.new_state.as_ref().map(|s| s.state.as_str())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn test_decode_state_changed() {
            let data: StateChangedData = serde_json::from_value(json!({
                "entity_id": "binary_sensor.dvere_front",
                "old_state": {"entity_id": "binary_sensor.dvere_front", "state": "off"},
                "new_state": {"entity_id": "binary_sensor.dvere_front", "state": "on"}
            }))
            .unwrap();

            assert_eq!(data.entity_id.as_str(), "binary_sensor.dvere_front");
            assert_eq!(data.new_state_value(), Some(STATE_ON));
            assert_eq!(data.old_state.unwrap().state, STATE_OFF);
        }

        #[test]
        fn test_decode_removed_entity() {
            let data: StateChangedData = serde_json::from_value(json!({
                "entity_id": "binary_sensor.dvere_front",
                "old_state": {"entity_id": "binary_sensor.dvere_front", "state": "on"},
                "new_state": null
            }))
            .unwrap();

            assert!(data.new_state.is_none());
            assert_eq!(data.new_state_value(), None);
        }

        #[test]
        fn test_invalid_entity_id_rejected() {
            let result = serde_json::from_value::<StateChangedData>(json!({
                "entity_id": "not-an-entity",
                "new_state": null
            }));
            assert!(result.is_err());
        }
    }
}
