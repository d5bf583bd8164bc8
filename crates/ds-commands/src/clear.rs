//! `clear`: delete the history of the notification channel

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ds_chat::{ChatMessage, ChatResult, ChatSink, BULK_DELETE_MAX_AGE_DAYS, MAX_PAGE_SIZE};
use tracing::{info, warn};

use crate::Command;

/// Pause between single deletes and between pages
pub const DEFAULT_PACE: Duration = Duration::from_secs(1);

pub struct ClearCommand {
    channel_id: String,
    pace: Duration,
}

impl ClearCommand {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            pace: DEFAULT_PACE,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    async fn pause(&self) {
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
    }

    /// Delete everything older than `command`, returning the number deleted
    ///
    /// `Err` carries the text to report when paging or bulk deletion fails.
    async fn clear(&self, sink: &dyn ChatSink, command: &ChatMessage) -> Result<usize, &'static str> {
        let max_age = chrono::Duration::days(BULK_DELETE_MAX_AGE_DAYS);
        let mut deleted = 0;
        let mut before = command.id.clone();

        loop {
            let page = match sink
                .list_messages(&self.channel_id, MAX_PAGE_SIZE, Some(&before))
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Error fetching messages");
                    return Err("Error fetching messages.");
                }
            };
            let Some(oldest) = page.last() else {
                break;
            };
            before = oldest.id.clone();

            let now = Utc::now();
            let (old, recent): (Vec<_>, Vec<_>) = page
                .iter()
                .filter(|m| m.id != command.id)
                .partition(|m| m.age(now) > max_age);

            if !recent.is_empty() {
                let ids: Vec<String> = recent.iter().map(|m| m.id.clone()).collect();
                if let Err(e) = sink.delete_messages_bulk(&self.channel_id, &ids).await {
                    warn!(error = %e, "Error bulk deleting messages");
                    return Err("Error bulk deleting messages.");
                }
                deleted += ids.len();
            }

            for message in old {
                match sink.delete_message(&self.channel_id, &message.id).await {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!(message_id = %message.id, error = %e, "Error deleting old message"),
                }
                self.pause().await;
            }

            self.pause().await;
        }

        Ok(deleted)
    }
}

#[async_trait]
impl Command for ClearCommand {
    fn name(&self) -> &'static str {
        "clear"
    }

    async fn execute(
        &self,
        sink: &dyn ChatSink,
        message: &ChatMessage,
        _args: &[&str],
    ) -> ChatResult<()> {
        if message.channel_id != self.channel_id {
            let text = format!(
                "This command can only be used in the configured channel: <#{}>",
                self.channel_id
            );
            sink.send_text(&message.channel_id, &text).await?;
            return Ok(());
        }

        sink.send_text(&message.channel_id, "Starting to clear channel...")
            .await?;

        let reply = match self.clear(sink, message).await {
            Ok(deleted) => {
                info!(deleted, "Cleared channel");
                format!("Finished clearing channel. Deleted {} messages.", deleted)
            }
            Err(text) => text.to_string(),
        };
        sink.send_text(&message.channel_id, &reply).await?;
        Ok(())
    }
}
