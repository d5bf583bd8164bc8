//! Home Assistant websocket client
//!
//! Maintains one authenticated websocket to the hub and multiplexes two
//! kinds of traffic over it:
//!
//! - correlated requests (`get_states`, `subscribe_events`), each waiting
//!   for the result frame that echoes its id
//! - the event feed, which carries every unsolicited `event` frame to a
//!   single consumer
//!
//! ```text
//!            ┌────────────┐  request(id=n)   ┌─────────┐
//! callers ──▶│ HubClient  │─────────────────▶│         │
//!            └────────────┘                  │   hub   │
//!                  ▲ result(id=n)            │         │
//!            ┌─────┴──────┐◀─────────────────│         │
//!            │ HubListener│  event frames    └─────────┘
//!            └─────┬──────┘
//!                  ▼
//!             event feed (mpsc, capacity 1)
//! ```

mod connection;
mod error;
mod types;

pub use connection::{HubClient, HubListener, REQUEST_TIMEOUT};
pub use error::{HubError, HubResult};
pub use types::{AuthMessage, ErrorInfo, HubCommand, HubMessage, RequestFrame};
