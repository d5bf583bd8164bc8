//! Hub connection handling
//!
//! Owns the websocket to the hub: runs the handshake, allocates request ids,
//! correlates results with waiting requesters and forwards events to the
//! single event feed consumer.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ds_core::{Event, State};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{HubError, HubResult};
use crate::types::{
    AuthMessage, HubCommand, HubMessage, RequestFrame, TYPE_AUTH_INVALID, TYPE_AUTH_OK,
    TYPE_AUTH_REQUIRED,
};

/// How long a correlated request waits for its result
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the event feed
///
/// tokio's smallest bounded channel. One event can be queued ahead of the
/// consumer; the receive loop waits on the one after that.
const EVENT_FEED_CAPACITY: usize = 1;

type FrameSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

// =============================================================================
// Shared State
// =============================================================================

struct Shared {
    writer: Mutex<FrameSink>,
    /// Next request id to hand out
    next_id: AtomicU64,
    /// Waiting requesters: request id -> single-use response slot
    pending: DashMap<u64, oneshot::Sender<HubMessage>>,
    /// Event feed receiver, taken by the one subscriber
    events: Mutex<Option<mpsc::Receiver<Event>>>,
    /// Set once the receive loop has stopped
    closed: AtomicBool,
    request_timeout: Duration,
    ha_version: Option<String>,
}

impl Shared {
    /// Add a response slot for `id`
    ///
    /// The closed flag is checked again after the insert: the receive loop
    /// sets it before clearing the table, so a slot added after the clear is
    /// always seen here and withdrawn.
    fn register(&self, id: u64) -> HubResult<oneshot::Receiver<HubMessage>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(HubError::Closed);
        }
        Ok(rx)
    }
}

/// Cloneable handle for issuing requests over an authenticated connection
#[derive(Clone)]
pub struct HubClient {
    shared: Arc<Shared>,
}

/// The receive side of the connection
///
/// Must be driven with [`HubListener::run`] for any request to complete.
pub struct HubListener {
    stream: FrameStream,
    shared: Arc<Shared>,
    events: mpsc::Sender<Event>,
}

// =============================================================================
// Handshake
// =============================================================================

impl HubClient {
    /// Connect to the hub websocket URL and authenticate
    pub async fn connect(url: &str, access_token: &str) -> HubResult<(HubClient, HubListener)> {
        info!(url, "Connecting to Home Assistant");
        let (ws, _) = connect_async(url).await?;
        Self::handshake(ws, access_token).await
    }

    /// Authenticate over an already-open websocket
    pub async fn handshake<S>(
        ws: WebSocketStream<S>,
        access_token: &str,
    ) -> HubResult<(HubClient, HubListener)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::handshake_with_timeout(ws, access_token, REQUEST_TIMEOUT).await
    }

    /// Like [`HubClient::handshake`] with a custom request timeout
    pub async fn handshake_with_timeout<S>(
        ws: WebSocketStream<S>,
        access_token: &str,
        request_timeout: Duration,
    ) -> HubResult<(HubClient, HubListener)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let mut sink: FrameSink = Box::pin(sink);
        let mut stream: FrameStream = Box::pin(stream);

        // 1. Receive auth_required
        debug!("Waiting for auth_required");
        let required = recv_handshake_frame(&mut stream).await?;
        if required.msg_type != TYPE_AUTH_REQUIRED {
            return Err(HubError::Protocol(format!(
                "expected {}, got {:?}",
                TYPE_AUTH_REQUIRED, required.msg_type
            )));
        }

        // 2. Send auth
        let auth = serde_json::to_string(&AuthMessage::new(access_token))?;
        sink.send(Message::Text(auth)).await?;

        // 3. Receive auth_ok or auth_invalid
        let response = recv_handshake_frame(&mut stream).await?;
        match response.msg_type.as_str() {
            TYPE_AUTH_OK => {}
            TYPE_AUTH_INVALID => return Err(HubError::Auth(response.auth_failure_reason())),
            other => {
                return Err(HubError::Protocol(format!(
                    "expected {} or {}, got {:?}",
                    TYPE_AUTH_OK, TYPE_AUTH_INVALID, other
                )))
            }
        }

        let ha_version = response.ha_version.or(required.ha_version);
        info!(ha_version = ?ha_version, "Authenticated with Home Assistant");

        let (events_tx, events_rx) = mpsc::channel(EVENT_FEED_CAPACITY);
        let shared = Arc::new(Shared {
            writer: Mutex::new(sink),
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            events: Mutex::new(Some(events_rx)),
            closed: AtomicBool::new(false),
            request_timeout,
            ha_version,
        });

        Ok((
            HubClient {
                shared: shared.clone(),
            },
            HubListener {
                stream,
                shared,
                events: events_tx,
            },
        ))
    }
}

/// Read the next data frame during the handshake, skipping control frames
async fn recv_handshake_frame(stream: &mut FrameStream) -> HubResult<HubMessage> {
    loop {
        match stream.next().await {
            None => return Err(HubError::ConnectionClosed),
            Some(Err(e)) => return Err(HubError::Transport(e)),
            Some(Ok(Message::Text(text))) => {
                trace!(frame = %text, "Handshake frame");
                return Ok(serde_json::from_str(&text)?);
            }
            Some(Ok(Message::Close(_))) => return Err(HubError::ConnectionClosed),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(other)) => {
                return Err(HubError::Protocol(format!(
                    "unexpected non-text frame: {:?}",
                    other
                )))
            }
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

impl HubClient {
    /// Allocate the next request id
    ///
    /// Ids start at 1 and are never reused on a connection.
    pub fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Version string the hub announced during the handshake
    pub fn ha_version(&self) -> Option<&str> {
        self.shared.ha_version.as_deref()
    }

    /// Number of requests still waiting for a result
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether the receive loop has stopped
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Send a command and wait for the frame carrying its id
    ///
    /// The response slot is registered before the frame is written, so a
    /// fast reply always finds its waiter. On timeout the slot is withdrawn
    /// and a late reply is dropped by the receive loop.
    pub async fn request(&self, command: &HubCommand) -> HubResult<HubMessage> {
        if self.is_closed() {
            return Err(HubError::Closed);
        }

        let id = self.next_id();
        let frame = serde_json::to_string(&RequestFrame { id, command })?;

        let rx = self.shared.register(id)?;

        if let Err(e) = self.send_text(frame).await {
            self.shared.pending.remove(&id);
            return Err(e);
        }
        debug!(id, command = command.name(), "Sent hub request");

        match tokio::time::timeout(self.shared.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Slot dropped without a reply: the receive loop is gone
            Ok(Err(_)) => Err(HubError::Closed),
            Err(_) => {
                self.shared.pending.remove(&id);
                warn!(id, command = command.name(), "Hub request timed out");
                Err(HubError::Timeout {
                    id,
                    after: self.shared.request_timeout,
                })
            }
        }
    }

    /// Subscribe to hub events and take the event feed
    ///
    /// Only one subscription is allowed per connection. If the hub refuses
    /// or the request times out the feed stays available for a retry.
    pub async fn subscribe_events(
        &self,
        event_type: Option<&str>,
    ) -> HubResult<mpsc::Receiver<Event>> {
        let mut feed = self.shared.events.lock().await;
        if feed.is_none() {
            return Err(HubError::AlreadySubscribed);
        }

        let command = HubCommand::SubscribeEvents {
            event_type: event_type.map(str::to_string),
        };
        self.request(&command).await?.into_result()?;
        info!(event_type = ?event_type, "Subscribed to Home Assistant events");

        feed.take().ok_or(HubError::AlreadySubscribed)
    }

    /// Fetch the current state of every entity
    pub async fn get_states(&self) -> HubResult<Vec<State>> {
        let result = self.request(&HubCommand::GetStates).await?.into_result()?;
        Ok(serde_json::from_value(result)?)
    }

    /// Ask the hub to close the websocket
    ///
    /// The receive loop ends once the hub acknowledges, which in turn closes
    /// the event feed.
    pub async fn close(&self) -> HubResult<()> {
        debug!("Closing hub connection");
        let mut writer = self.shared.writer.lock().await;
        writer.send(Message::Close(None)).await?;
        Ok(())
    }

    async fn send_text(&self, text: String) -> HubResult<()> {
        trace!(frame = %text, "Sending hub frame");
        let mut writer = self.shared.writer.lock().await;
        writer.send(Message::Text(text)).await?;
        Ok(())
    }
}

// =============================================================================
// Receive Loop
// =============================================================================

impl HubListener {
    /// Demultiplex inbound frames until the transport fails or closes
    ///
    /// Returns the reason the loop stopped. On return the event feed is
    /// closed and every waiting requester is released with
    /// [`HubError::Closed`].
    pub async fn run(mut self) -> HubError {
        let reason = loop {
            let text = match self.stream.next().await {
                None => break HubError::ConnectionClosed,
                Some(Err(e)) => break HubError::Transport(e),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "Hub sent close frame");
                    break HubError::ConnectionClosed;
                }
                Some(Ok(_)) => continue,
            };

            let frame: HubMessage = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable hub frame");
                    continue;
                }
            };
            Self::dispatch(&self.shared, &self.events, frame).await;
        };

        info!(reason = %reason, "Hub receive loop stopped");
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.pending.clear();
        reason
    }

    async fn dispatch(shared: &Shared, events: &mpsc::Sender<Event>, frame: HubMessage) {
        if let Some(id) = frame.id {
            if let Some((_, slot)) = shared.pending.remove(&id) {
                if slot.send(frame).is_err() {
                    debug!(id, "Requester stopped waiting before the result arrived");
                }
                return;
            }
        }

        if !frame.is_event() {
            debug!(id = ?frame.id, msg_type = %frame.msg_type, "Dropping frame with no waiter");
            return;
        }

        match frame.event {
            Some(event) => {
                trace!(event_type = %event.event_type, "Publishing hub event");
                if events.send(event).await.is_err() {
                    debug!("Event feed has no consumer, dropping event");
                }
            }
            None => warn!(id = ?frame.id, "Event frame without an event payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn shared() -> Shared {
        let writer: FrameSink =
            Box::pin(sink::drain().sink_map_err(|never| -> tungstenite::Error { match never {} }));
        Shared {
            writer: Mutex::new(writer),
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            events: Mutex::new(None),
            closed: AtomicBool::new(false),
            request_timeout: REQUEST_TIMEOUT,
            ha_version: None,
        }
    }

    #[test]
    fn test_register_adds_slot() {
        let shared = shared();
        assert!(shared.register(1).is_ok());
        assert_eq!(shared.pending.len(), 1);
    }

    #[test]
    fn test_register_after_loop_stopped_withdraws_slot() {
        let shared = shared();
        // Receive loop stopped and cleared the table after the caller's
        // closed check
        shared.closed.store(true, Ordering::SeqCst);
        shared.pending.clear();

        assert!(matches!(shared.register(1), Err(HubError::Closed)));
        assert!(shared.pending.is_empty());
    }
}
