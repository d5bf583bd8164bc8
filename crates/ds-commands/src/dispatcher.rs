//! Prefix command dispatcher

use std::collections::HashMap;
use std::sync::Arc;

use ds_chat::{ChatMessage, ChatSink};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::Command;

/// Routes prefixed chat messages to registered commands
pub struct Dispatcher {
    prefix: String,
    sink: Arc<dyn ChatSink>,
    commands: HashMap<&'static str, Arc<dyn Command>>,
}

impl Dispatcher {
    pub fn new(prefix: impl Into<String>, sink: Arc<dyn ChatSink>) -> Self {
        Self {
            prefix: prefix.into(),
            sink,
            commands: HashMap::new(),
        }
    }

    /// Register a command under its name, replacing any previous one
    pub fn register(&mut self, command: impl Command + 'static) {
        self.commands.insert(command.name(), Arc::new(command));
    }

    pub fn with(mut self, command: impl Command + 'static) -> Self {
        self.register(command);
        self
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Split a message into command name and arguments
    ///
    /// Returns `None` for messages without the prefix or with nothing after it.
    pub fn parse<'a>(&self, content: &'a str) -> Option<(&'a str, Vec<&'a str>)> {
        let rest = content.strip_prefix(self.prefix.as_str())?;
        let mut words = rest.split_whitespace();
        let name = words.next()?;
        Some((name, words.collect()))
    }

    /// Run the command a message asks for, if any
    ///
    /// Returns whether a command ran. Send failures are logged.
    #[instrument(skip(self, message), fields(message_id = %message.id, channel_id = %message.channel_id))]
    pub async fn dispatch(&self, message: &ChatMessage) -> bool {
        let Some((name, args)) = self.parse(&message.content) else {
            return false;
        };
        let Some(command) = self.commands.get(name) else {
            debug!(command = name, "Unknown command");
            return false;
        };

        info!(command = name, author = %message.author.id, "Running command");
        if let Err(e) = command.execute(self.sink.as_ref(), message, &args).await {
            warn!(command = name, error = %e, "Command failed to reply");
        }
        true
    }

    /// Dispatch every message from `messages` until the channel closes
    ///
    /// Each command runs in its own task so a long `clear` does not hold up
    /// the others.
    pub async fn run(self: Arc<Self>, mut messages: mpsc::Receiver<ChatMessage>) {
        info!(prefix = %self.prefix, commands = ?self.command_names(), "Command dispatcher started");
        while let Some(message) = messages.recv().await {
            if self.parse(&message.content).is_none() {
                continue;
            }
            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(&message).await;
            });
        }
        info!("Message stream closed, dispatcher stopped");
    }
}
