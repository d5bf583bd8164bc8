//! Hub websocket message types
//!
//! Defines the frames exchanged with the hub: the handshake messages,
//! correlated requests, and the single inbound frame shape that covers
//! handshake replies, results and events.

use ds_core::Event;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

pub const TYPE_AUTH_REQUIRED: &str = "auth_required";
pub const TYPE_AUTH_OK: &str = "auth_ok";
pub const TYPE_AUTH_INVALID: &str = "auth_invalid";
pub const TYPE_RESULT: &str = "result";
pub const TYPE_EVENT: &str = "event";

// =============================================================================
// Incoming Messages
// =============================================================================

/// Any frame received from the hub
///
/// The hub uses one loose shape for everything, so every field except the
/// discriminator is optional. Some hubs omit `type` on error results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubMessage {
    /// Present on results and events, echoing the request id
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(rename = "type", default)]
    pub msg_type: String,

    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub result: Option<serde_json::Value>,

    #[serde(default)]
    pub error: Option<ErrorInfo>,

    #[serde(default)]
    pub event: Option<Event>,

    /// Human-readable reason on `auth_invalid`
    #[serde(default)]
    pub message: Option<String>,

    /// Hub version announced on `auth_required` and `auth_ok`
    #[serde(default)]
    pub ha_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl HubMessage {
    pub fn is_event(&self) -> bool {
        self.msg_type == TYPE_EVENT
    }

    /// Turn a result frame into its payload or a request error
    ///
    /// A successful result without a payload yields `Value::Null`.
    pub fn into_result(self) -> HubResult<serde_json::Value> {
        if self.success {
            return Ok(self.result.unwrap_or(serde_json::Value::Null));
        }
        let error = self.error.unwrap_or_default();
        Err(HubError::Request {
            code: if error.code.is_empty() {
                "unknown_error".to_string()
            } else {
                error.code
            },
            message: if error.message.is_empty() {
                "request failed without a message".to_string()
            } else {
                error.message
            },
        })
    }

    /// Reason given by an `auth_invalid` frame
    pub fn auth_failure_reason(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.as_ref().map(|e| e.message.clone()))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "invalid access token".to_string())
    }
}

// =============================================================================
// Outgoing Messages
// =============================================================================

/// The credential frame sent during the handshake
#[derive(Debug, Serialize)]
pub struct AuthMessage<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub access_token: &'a str,
}

impl<'a> AuthMessage<'a> {
    pub fn new(access_token: &'a str) -> Self {
        Self {
            msg_type: "auth",
            access_token,
        }
    }
}

/// A command that expects a correlated result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubCommand {
    SubscribeEvents {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },
    GetStates,
}

impl HubCommand {
    pub fn name(&self) -> &'static str {
        match self {
            HubCommand::SubscribeEvents { .. } => "subscribe_events",
            HubCommand::GetStates => "get_states",
        }
    }
}

/// A command stamped with its request id
#[derive(Debug, Serialize)]
pub struct RequestFrame<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub command: &'a HubCommand,
}
