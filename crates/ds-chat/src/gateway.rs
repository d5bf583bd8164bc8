//! Discord gateway listener
//!
//! Keeps just enough of a gateway session alive to receive channel
//! messages: Hello, Identify, heartbeats, READY and MESSAGE_CREATE. Resume
//! and reconnect are not handled; any session-level failure ends
//! [`DiscordGateway::run`] with an error.

use std::ops::BitOr;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{ChatError, ChatResult};
use crate::types::ChatMessage;

/// Gateway endpoint for API v10 with JSON encoding
pub const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Gateway intent bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayIntents(u64);

impl GatewayIntents {
    pub const GUILDS: Self = Self(1 << 0);
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    pub const MESSAGE_CONTENT: Self = Self(1 << 15);

    pub fn bits(self) -> u64 {
        self.0
    }

    /// What a prefix-command bot needs: guild channels and message text
    pub fn for_commands() -> Self {
        Self::GUILDS | Self::GUILD_MESSAGES | Self::MESSAGE_CONTENT
    }
}

impl BitOr for GatewayIntents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// A gateway connection that forwards channel messages
pub struct DiscordGateway {
    token: String,
    intents: GatewayIntents,
    url: String,
}

impl DiscordGateway {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            intents: GatewayIntents::for_commands(),
            url: DISCORD_GATEWAY_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_intents(mut self, intents: GatewayIntents) -> Self {
        self.intents = intents;
        self
    }

    /// Connect and forward every message not authored by the bot itself
    ///
    /// Returns `Ok(())` when the receiving side of `messages` is dropped.
    pub async fn run(&self, messages: mpsc::Sender<ChatMessage>) -> ChatResult<()> {
        info!(url = %self.url, "Connecting to Discord gateway");
        let (ws, _) = connect_async(self.url.as_str()).await?;
        self.run_on(ws, messages).await
    }

    /// Run a session over an already-open websocket
    pub async fn run_on<S>(
        &self,
        ws: WebSocketStream<S>,
        messages: mpsc::Sender<ChatMessage>,
    ) -> ChatResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();

        let hello = next_payload(&mut stream).await?;
        if hello.op != opcode::HELLO {
            return Err(ChatError::Gateway(format!(
                "expected Hello, got opcode {}",
                hello.op
            )));
        }
        let period = hello
            .d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .ok_or_else(|| ChatError::Gateway("Hello without heartbeat_interval".to_string()))?;

        send_payload(
            &mut sink,
            json!({
                "op": opcode::IDENTIFY,
                "d": {
                    "token": self.token,
                    "intents": self.intents.bits(),
                    "properties": {
                        "os": std::env::consts::OS,
                        "browser": "door-sentry",
                        "device": "door-sentry"
                    }
                }
            }),
        )
        .await?;
        debug!(heartbeat = ?period, "Sent Identify");

        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut seq: Option<u64> = None;
        let mut self_id: Option<String> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    send_payload(&mut sink, json!({"op": opcode::HEARTBEAT, "d": seq})).await?;
                    trace!(seq = ?seq, "Sent heartbeat");
                }
                payload = next_payload(&mut stream) => {
                    let payload = payload?;
                    if payload.s.is_some() {
                        seq = payload.s;
                    }

                    match payload.op {
                        opcode::DISPATCH => match payload.t.as_deref() {
                            Some("READY") => {
                                self_id = payload.d["user"]["id"].as_str().map(str::to_string);
                                info!(user_id = ?self_id, "Discord gateway ready");
                            }
                            Some("MESSAGE_CREATE") => {
                                let message: ChatMessage = match serde_json::from_value(payload.d) {
                                    Ok(message) => message,
                                    Err(e) => {
                                        warn!(error = %e, "Skipping undecodable MESSAGE_CREATE");
                                        continue;
                                    }
                                };
                                if self_id.as_deref() == Some(message.author.id.as_str()) {
                                    continue;
                                }
                                if messages.send(message).await.is_err() {
                                    info!("Message consumer stopped, leaving gateway");
                                    return Ok(());
                                }
                            }
                            other => trace!(event = ?other, "Ignoring dispatch"),
                        },
                        opcode::HEARTBEAT => {
                            send_payload(&mut sink, json!({"op": opcode::HEARTBEAT, "d": seq})).await?;
                        }
                        opcode::HEARTBEAT_ACK => trace!("Heartbeat acknowledged"),
                        opcode::RECONNECT => {
                            return Err(ChatError::Gateway("gateway requested a reconnect".to_string()))
                        }
                        opcode::INVALID_SESSION => {
                            return Err(ChatError::Gateway("gateway session invalidated".to_string()))
                        }
                        other => debug!(opcode = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }
}

async fn next_payload<St>(stream: &mut St) -> ChatResult<GatewayPayload>
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            None => return Err(ChatError::Gateway("connection closed".to_string())),
            Some(Err(e)) => return Err(ChatError::Transport(e)),
            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                Ok(payload) => return Ok(payload),
                Err(e) => warn!(error = %e, "Skipping undecodable gateway frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                return Err(ChatError::Gateway(format!("closed by gateway: {:?}", frame)))
            }
            Some(Ok(_)) => continue,
        }
    }
}

async fn send_payload<Si>(sink: &mut Si, payload: Value) -> ChatResult<()>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(payload.to_string())).await?;
    Ok(())
}
