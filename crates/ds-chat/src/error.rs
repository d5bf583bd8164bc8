//! Error types for chat operations

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors that can occur while talking to the chat platform
#[derive(Debug, Error)]
pub enum ChatError {
    /// The HTTP request could not be performed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("chat API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// A payload could not be decoded
    #[error("failed to decode chat payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The gateway websocket failed
    #[error("gateway transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The gateway sent something the session cannot continue from
    #[error("gateway error: {0}")]
    Gateway(String),
}
