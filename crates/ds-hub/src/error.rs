//! Error types for the hub connection

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;

/// Errors that can occur while talking to the hub
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub sent a frame the handshake did not expect
    #[error("unexpected message during handshake: {0}")]
    Protocol(String),

    /// The hub rejected the access token
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Reading from or writing to the websocket failed
    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The hub closed the websocket
    #[error("connection closed by hub")]
    ConnectionClosed,

    /// No response arrived for a correlated request in time
    #[error("no response to request {id} within {after:?}")]
    Timeout { id: u64, after: Duration },

    /// A frame or payload could not be decoded
    #[error("failed to decode hub message: {0}")]
    Decode(#[from] serde_json::Error),

    /// The hub answered a request with `success: false`
    #[error("request failed ({code}): {message}")]
    Request { code: String, message: String },

    /// The event feed was already handed out on this connection
    #[error("already subscribed to events on this connection")]
    AlreadySubscribed,

    /// The receive loop has stopped; no response can arrive anymore
    #[error("hub connection is closed")]
    Closed,
}
