//! Chat sink contract and its Discord implementation
//!
//! Everything outside this crate talks to the chat platform through the
//! [`ChatSink`] trait: send text, list history, bulk delete and single
//! delete. [`DiscordRest`] implements it over the Discord REST API,
//! [`DiscordGateway`] delivers incoming channel messages, and
//! [`MemorySink`] keeps everything in memory for tests and dry runs.

mod discord;
mod error;
mod gateway;
mod memory;
mod types;

use async_trait::async_trait;

pub use discord::{DiscordRest, DISCORD_API_BASE};
pub use error::{ChatError, ChatResult};
pub use gateway::{DiscordGateway, GatewayIntents, DISCORD_GATEWAY_URL};
pub use memory::MemorySink;
pub use types::{Author, ChatMessage};

/// Maximum number of messages one history page or bulk delete may cover
pub const MAX_PAGE_SIZE: usize = 100;

/// Messages older than this can only be deleted one at a time
pub const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

/// The capabilities the bot needs from a chat platform
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Post `text` to `channel_id`, returning the created message
    async fn send_text(&self, channel_id: &str, text: &str) -> ChatResult<ChatMessage>;

    /// Fetch up to `limit` messages older than `before`, newest first
    async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> ChatResult<Vec<ChatMessage>>;

    /// Delete several messages younger than [`BULK_DELETE_MAX_AGE_DAYS`] at once
    async fn delete_messages_bulk(&self, channel_id: &str, message_ids: &[String])
        -> ChatResult<()>;

    /// Delete one message regardless of its age
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ChatResult<()>;
}
