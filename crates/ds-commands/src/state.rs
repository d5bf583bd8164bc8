//! `state`: list door sensor states straight from the hub

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use ds_chat::{ChatMessage, ChatResult, ChatSink};
use ds_core::State;
use ds_hub::{HubClient, HubError, HubResult};
use tracing::warn;

use crate::Command;

/// Something that can answer a `get_states` request
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn get_states(&self) -> HubResult<Vec<State>>;
}

#[async_trait]
impl StateSource for HubClient {
    async fn get_states(&self) -> HubResult<Vec<State>> {
        HubClient::get_states(self).await
    }
}

pub struct StateCommand {
    source: Arc<dyn StateSource>,
    sensor_prefix: String,
}

impl StateCommand {
    pub fn new(source: Arc<dyn StateSource>, sensor_prefix: impl Into<String>) -> Self {
        Self {
            source,
            sensor_prefix: sensor_prefix.into(),
        }
    }

    fn render(&self, states: &[State]) -> String {
        let mut out = format!("**Home Assistant States ({}):**\n", self.sensor_prefix);
        let mut found = false;
        for state in states
            .iter()
            .filter(|s| s.entity_id.has_prefix(&self.sensor_prefix))
        {
            let _ = writeln!(out, "- `{}`: `{}`", state.entity_id, state.state);
            found = true;
        }
        if !found {
            out.push_str("No matching entities found.\n");
        }
        out
    }
}

fn failure_text(err: &HubError) -> String {
    match err {
        HubError::Request { message, .. } => format!("Failed to get states: {}", message),
        HubError::Timeout { .. } => "Timeout waiting for Home Assistant states.".to_string(),
        HubError::Decode(_) => "Error processing states from Home Assistant.".to_string(),
        _ => "Error fetching states from Home Assistant.".to_string(),
    }
}

#[async_trait]
impl Command for StateCommand {
    fn name(&self) -> &'static str {
        "state"
    }

    async fn execute(
        &self,
        sink: &dyn ChatSink,
        message: &ChatMessage,
        _args: &[&str],
    ) -> ChatResult<()> {
        let reply = match self.source.get_states().await {
            Ok(states) => self.render(&states),
            Err(e) => {
                warn!(error = %e, "get_states failed");
                failure_text(&e)
            }
        };
        sink.send_text(&message.channel_id, &reply).await?;
        Ok(())
    }
}
