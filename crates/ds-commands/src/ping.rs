use async_trait::async_trait;
use ds_chat::{ChatMessage, ChatResult, ChatSink};

use crate::Command;

pub struct PingCommand;

#[async_trait]
impl Command for PingCommand {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn execute(
        &self,
        sink: &dyn ChatSink,
        message: &ChatMessage,
        _args: &[&str],
    ) -> ChatResult<()> {
        sink.send_text(&message.channel_id, "Pong!").await?;
        Ok(())
    }
}
