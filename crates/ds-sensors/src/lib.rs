//! Door sensor tracking and escalation
//!
//! [`EventIngestor`] feeds `state_changed` events for matching sensors into
//! the [`SensorRegistry`]; [`EscalationClock`] scans the registry on a fixed
//! interval and sends the initial alert, reminders and the expiry notice
//! through a [`ds_chat::ChatSink`]. Pausing suppresses messages only: timing
//! keeps advancing and entries still expire.

mod clock;
mod escalation;
mod ingestor;
pub mod message;
mod registry;

pub use clock::{Clock, MockClock, SystemClock};
pub use escalation::EscalationClock;
pub use ingestor::EventIngestor;
pub use registry::{
    Escalation, EscalationPolicy, PauseChange, PauseStatus, PauseSummary, SensorEntry,
    SensorRegistry, Transition,
};
