//! `pause`: show or change notification pausing for open doors

use std::sync::Arc;

use async_trait::async_trait;
use ds_chat::{ChatMessage, ChatResult, ChatSink};
use ds_sensors::{PauseChange, PauseStatus, PauseSummary, SensorRegistry};

use crate::Command;

pub struct PauseCommand {
    registry: Arc<SensorRegistry>,
    prefix: String,
}

impl PauseCommand {
    pub fn new(registry: Arc<SensorRegistry>, prefix: impl Into<String>) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
        }
    }

    fn status_text(&self, status: PauseStatus) -> String {
        let p = &self.prefix;
        match status.summary() {
            PauseSummary::NoneOpen => "ℹ️ **No doors are currently open**\n\n\
                 There are no active door sensors to pause notifications for."
                .to_string(),
            PauseSummary::AllActive => format!(
                "✅ **Door sensor notifications are ACTIVE**\n\n\
                 {} door(s) are currently open and notifications are enabled.\n\n\
                 Use `{p}pause on` to pause notifications for currently open doors",
                status.total
            ),
            PauseSummary::AllPaused => format!(
                "🚫 **Door sensor notifications are PAUSED**\n\n\
                 {} door(s) are currently open but notifications are paused.\n\n\
                 Use `{p}pause off` to resume notifications",
                status.total
            ),
            PauseSummary::Mixed => format!(
                "⚠️ **Door sensor notifications are PARTIALLY PAUSED**\n\n\
                 {} door(s) are currently open:\n\
                 • {} have notifications paused\n\
                 • {} have notifications active\n\n\
                 Use `{p}pause on` to pause all\n\
                 Use `{p}pause off` to resume all",
                status.total,
                status.paused,
                status.active()
            ),
        }
    }

    async fn pause(&self) -> String {
        let PauseChange { changed, status } = self.registry.pause().await;
        if changed > 0 {
            format!(
                "🚫 **Door sensor notifications PAUSED**\n\n\
                 Notifications have been paused for {} currently open door(s).\n\n\
                 These doors will continue to be tracked but won't send notifications \
                 until you resume them or they close naturally.",
                changed
            )
        } else {
            format!(
                "ℹ️ **No doors to pause**\n\n\
                 There are no currently open doors to pause notifications for. (Total open: {})",
                status.total
            )
        }
    }

    async fn resume(&self) -> String {
        let PauseChange { status, .. } = self.registry.resume().await;
        if status.total == 0 {
            "ℹ️ **No doors to resume**\n\n\
             There are no currently open doors to resume notifications for."
                .to_string()
        } else {
            format!(
                "✅ **Door sensor notifications RESUMED**\n\n\
                 Notifications have been resumed for all {} currently open door(s).",
                status.total
            )
        }
    }

    fn invalid_text(&self, action: &str) -> String {
        let p = &self.prefix;
        format!(
            "❌ **Invalid action: `{action}`**\n\n\
             Valid actions:\n\
             • `{p}pause on` - Pause notifications for currently open doors\n\
             • `{p}pause off` - Resume notifications for currently open doors\n\
             • `{p}pause` - Show current status"
        )
    }
}

#[async_trait]
impl Command for PauseCommand {
    fn name(&self) -> &'static str {
        "pause"
    }

    async fn execute(
        &self,
        sink: &dyn ChatSink,
        message: &ChatMessage,
        args: &[&str],
    ) -> ChatResult<()> {
        let reply = match args.first().map(|a| a.to_lowercase()) {
            None => self.status_text(self.registry.status().await),
            Some(action) => match action.as_str() {
                "on" | "pause" | "stop" => self.pause().await,
                "off" | "resume" | "start" => self.resume().await,
                _ => self.invalid_text(&action),
            },
        };
        sink.send_text(&message.channel_id, &reply).await?;
        Ok(())
    }
}
