//! In-memory chat sink

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{ChatError, ChatResult};
use crate::types::{Author, ChatMessage};
use crate::ChatSink;

/// A chat sink that keeps channel history in memory
///
/// Sent messages become part of the history, so a `clear` run against it
/// behaves like one against a real channel. Message ids are numeric and
/// increase with insertion order, like Discord snowflakes.
pub struct MemorySink {
    history: Mutex<Vec<ChatMessage>>,
    sent: Mutex<Vec<(String, String)>>,
    bulk_deletes: Mutex<Vec<Vec<String>>>,
    single_deletes: Mutex<Vec<String>>,
    next_id: AtomicU64,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            bulk_deletes: Mutex::new(Vec::new()),
            single_deletes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with an API error (or stop failing)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Add an existing message to the channel history
    pub async fn seed(&self, message: ChatMessage) {
        self.history.lock().await.push(message);
    }

    /// Allocate the next message id
    pub fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Every `(channel_id, text)` sent so far, oldest first
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    /// Texts sent so far, oldest first
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Ids passed to each bulk delete call
    pub async fn bulk_deletes(&self) -> Vec<Vec<String>> {
        self.bulk_deletes.lock().await.clone()
    }

    /// Ids passed to single delete calls
    pub async fn single_deletes(&self) -> Vec<String> {
        self.single_deletes.lock().await.clone()
    }

    /// Ids of the messages still in the channel
    pub async fn remaining_ids(&self) -> Vec<String> {
        self.history
            .lock()
            .await
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    fn check_failing(&self) -> ChatResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChatError::Api {
                status: 503,
                body: "sink is failing".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

fn snowflake(id: &str) -> u64 {
    id.parse().unwrap_or(0)
}

#[async_trait]
impl ChatSink for MemorySink {
    async fn send_text(&self, channel_id: &str, text: &str) -> ChatResult<ChatMessage> {
        self.check_failing()?;
        let message = ChatMessage {
            id: self.allocate_id(),
            channel_id: channel_id.to_string(),
            content: text.to_string(),
            author: Author {
                id: "0".to_string(),
                username: "door-sentry".to_string(),
                bot: true,
            },
            timestamp: Utc::now(),
        };
        self.sent
            .lock()
            .await
            .push((channel_id.to_string(), text.to_string()));
        self.history.lock().await.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> ChatResult<Vec<ChatMessage>> {
        self.check_failing()?;
        let before = before.map(snowflake).unwrap_or(u64::MAX);
        let mut page: Vec<ChatMessage> = self
            .history
            .lock()
            .await
            .iter()
            .filter(|m| m.channel_id == channel_id && snowflake(&m.id) < before)
            .cloned()
            .collect();
        page.sort_by_key(|m| std::cmp::Reverse(snowflake(&m.id)));
        page.truncate(limit);
        Ok(page)
    }

    async fn delete_messages_bulk(
        &self,
        channel_id: &str,
        message_ids: &[String],
    ) -> ChatResult<()> {
        self.check_failing()?;
        self.history
            .lock()
            .await
            .retain(|m| m.channel_id != channel_id || !message_ids.contains(&m.id));
        self.bulk_deletes.lock().await.push(message_ids.to_vec());
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ChatResult<()> {
        self.check_failing()?;
        self.history
            .lock()
            .await
            .retain(|m| m.channel_id != channel_id || m.id != message_id);
        self.single_deletes
            .lock()
            .await
            .push(message_id.to_string());
        Ok(())
    }
}
