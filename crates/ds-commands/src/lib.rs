//! Chat commands
//!
//! A [`Dispatcher`] matches incoming chat messages against its prefix and
//! routes the first word to a registered [`Command`]. Commands reply in the
//! channel the message came from.

mod clear;
mod dispatcher;
mod pause;
mod ping;
mod state;

use async_trait::async_trait;
use ds_chat::{ChatMessage, ChatResult, ChatSink};

pub use clear::ClearCommand;
pub use dispatcher::Dispatcher;
pub use pause::PauseCommand;
pub use ping::PingCommand;
pub use state::{StateCommand, StateSource};

/// A prefix-triggered chat command
#[async_trait]
pub trait Command: Send + Sync {
    /// The word after the prefix that selects this command
    fn name(&self) -> &'static str;

    /// Run with the words following the command name
    async fn execute(
        &self,
        sink: &dyn ChatSink,
        message: &ChatMessage,
        args: &[&str],
    ) -> ChatResult<()>;
}
