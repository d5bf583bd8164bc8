//! Event feed consumer

use std::sync::Arc;

use ds_chat::ChatSink;
use ds_core::events::{StateChangedData, STATE_CHANGED};
use ds_core::Event;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::message;
use crate::registry::{SensorRegistry, Transition};

/// Applies door sensor state changes from the hub to the registry
pub struct EventIngestor {
    registry: Arc<SensorRegistry>,
    sink: Arc<dyn ChatSink>,
    channel_id: String,
    sensor_prefix: String,
}

impl EventIngestor {
    pub fn new(
        registry: Arc<SensorRegistry>,
        sink: Arc<dyn ChatSink>,
        channel_id: impl Into<String>,
        sensor_prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            sink,
            channel_id: channel_id.into(),
            sensor_prefix: sensor_prefix.into(),
        }
    }

    /// Consume the feed until the hub connection closes it
    pub async fn run(self, mut events: mpsc::Receiver<Event>) {
        info!(prefix = %self.sensor_prefix, "Event ingestor started");
        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }
        info!("Event feed closed, ingestor stopped");
    }

    /// Apply one event
    pub async fn handle(&self, event: &Event) {
        if event.event_type != STATE_CHANGED {
            trace!(event_type = %event.event_type, "Ignoring event");
            return;
        }

        let data: StateChangedData = match event.decode() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable state_changed event");
                return;
            }
        };
        if !data.entity_id.has_prefix(&self.sensor_prefix) {
            return;
        }

        let state = data.new_state_value().unwrap_or_default();
        debug!(entity_id = %data.entity_id, state, "Door sensor changed");

        let transition = self.registry.apply_state(&data.entity_id, state).await;
        if transition == (Transition::Closed { notified: true }) {
            let text = message::closed(&data.entity_id);
            if let Err(e) = self.sink.send_text(&self.channel_id, &text).await {
                warn!(entity_id = %data.entity_id, error = %e, "Failed to send closed notification");
            }
        }
    }
}
