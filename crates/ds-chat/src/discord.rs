//! Discord REST implementation of the chat sink

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response};
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{ChatError, ChatResult};
use crate::types::ChatMessage;
use crate::{ChatSink, MAX_PAGE_SIZE};

/// Discord REST API root
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Chat sink backed by the Discord REST API
pub struct DiscordRest {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl DiscordRest {
    /// Create a sink for the given bot token
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, DISCORD_API_BASE)
    }

    /// Create a sink that talks to a different API root
    pub fn with_base_url(token: &str, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// API root this sink talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.base_url, channel_id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    /// Turn non-2xx responses into [`ChatError::Api`]
    async fn check(response: Response) -> ChatResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChatError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ChatSink for DiscordRest {
    #[instrument(skip(self, text))]
    async fn send_text(&self, channel_id: &str, text: &str) -> ChatResult<ChatMessage> {
        let request = self
            .http
            .post(self.messages_url(channel_id))
            .json(&json!({ "content": text }));
        let response = Self::check(self.authorized(request).send().await?).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self))]
    async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> ChatResult<Vec<ChatMessage>> {
        let mut query = vec![("limit", limit.clamp(1, MAX_PAGE_SIZE).to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let request = self.http.get(self.messages_url(channel_id)).query(&query);
        let response = Self::check(self.authorized(request).send().await?).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, message_ids), fields(count = message_ids.len()))]
    async fn delete_messages_bulk(
        &self,
        channel_id: &str,
        message_ids: &[String],
    ) -> ChatResult<()> {
        match message_ids {
            [] => return Ok(()),
            // The bulk endpoint rejects fewer than two ids
            [single] => return self.delete_message(channel_id, single).await,
            _ => {}
        }

        for chunk in message_ids.chunks(MAX_PAGE_SIZE) {
            if let [single] = chunk {
                self.delete_message(channel_id, single).await?;
                continue;
            }
            let request = self
                .http
                .post(format!("{}/bulk-delete", self.messages_url(channel_id)))
                .json(&json!({ "messages": chunk }));
            Self::check(self.authorized(request).send().await?).await?;
            debug!(count = chunk.len(), "Bulk deleted messages");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ChatResult<()> {
        let request = self
            .http
            .delete(format!("{}/{}", self.messages_url(channel_id), message_id));
        Self::check(self.authorized(request).send().await?).await?;
        Ok(())
    }
}
