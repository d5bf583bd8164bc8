//! Command behavior against an in-memory chat channel

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ds_chat::{Author, ChatError, ChatMessage, ChatResult, ChatSink, MemorySink};
use ds_commands::{
    ClearCommand, Command, Dispatcher, PauseCommand, PingCommand, StateCommand, StateSource,
};
use ds_core::{EntityId, State};
use ds_hub::{HubError, HubResult};
use ds_sensors::{MockClock, SensorRegistry};
use tokio::sync::mpsc;

const CHANNEL: &str = "42";

fn user_message(id: &str, channel_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        content: content.to_string(),
        author: Author {
            id: "7".to_string(),
            username: "alice".to_string(),
            bot: false,
        },
        timestamp: Utc::now(),
    }
}

fn aged(id: u64, days: i64) -> ChatMessage {
    let mut message = user_message(&id.to_string(), CHANNEL, "old news");
    message.timestamp = Utc::now() - chrono::Duration::days(days);
    message
}

fn entity(id: &str) -> EntityId {
    id.parse().unwrap()
}

// =============================================================================
// Dispatcher
// =============================================================================

#[tokio::test]
async fn test_dispatch_routes_prefixed_messages() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = Dispatcher::new("!", sink.clone()).with(PingCommand);

    assert!(dispatcher.dispatch(&user_message("1", "99", "!ping")).await);
    assert_eq!(
        sink.sent().await,
        vec![("99".to_string(), "Pong!".to_string())]
    );
}

#[tokio::test]
async fn test_dispatch_ignores_unprefixed_and_unknown() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = Dispatcher::new("!", sink.clone()).with(PingCommand);

    assert!(!dispatcher.dispatch(&user_message("1", CHANNEL, "ping")).await);
    assert!(!dispatcher.dispatch(&user_message("2", CHANNEL, "!pong")).await);
    assert!(!dispatcher.dispatch(&user_message("3", CHANNEL, "!")).await);
    assert!(sink.sent().await.is_empty());
}

#[tokio::test]
async fn test_run_dispatches_until_stream_ends() {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = Arc::new(Dispatcher::new("!", sink.clone()).with(PingCommand));
    let (tx, rx) = mpsc::channel(8);

    let run = tokio::spawn(dispatcher.run(rx));
    tx.send(user_message("1", CHANNEL, "hello")).await.unwrap();
    tx.send(user_message("2", CHANNEL, "!ping")).await.unwrap();
    drop(tx);
    run.await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        while sink.sent_texts().await.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(sink.sent_texts().await, vec!["Pong!"]);
}

// =============================================================================
// pause
// =============================================================================

struct PauseFixture {
    sink: MemorySink,
    registry: Arc<SensorRegistry>,
    command: PauseCommand,
}

impl PauseFixture {
    async fn with_open(doors: &[&str]) -> Self {
        let registry = Arc::new(SensorRegistry::new(Arc::new(MockClock::new())));
        for door in doors {
            registry.apply_state(&entity(door), "on").await;
        }
        Self {
            sink: MemorySink::new(),
            command: PauseCommand::new(registry.clone(), "!"),
            registry,
        }
    }

    async fn run(&self, args: &[&str]) -> String {
        let message = user_message("1", CHANNEL, "!pause");
        self.command.execute(&self.sink, &message, args).await.unwrap();
        self.sink.sent_texts().await.pop().unwrap()
    }
}

#[tokio::test]
async fn test_pause_status_none_open() {
    let f = PauseFixture::with_open(&[]).await;
    assert_eq!(
        f.run(&[]).await,
        "ℹ️ **No doors are currently open**\n\nThere are no active door sensors to pause notifications for."
    );
}

#[tokio::test]
async fn test_pause_status_active_paused_and_mixed() {
    let f = PauseFixture::with_open(&["binary_sensor.dvere_front", "binary_sensor.dvere_back"]).await;
    assert_eq!(
        f.run(&[]).await,
        "✅ **Door sensor notifications are ACTIVE**\n\n2 door(s) are currently open and notifications are enabled.\n\nUse `!pause on` to pause notifications for currently open doors"
    );

    f.registry.pause().await;
    assert_eq!(
        f.run(&[]).await,
        "🚫 **Door sensor notifications are PAUSED**\n\n2 door(s) are currently open but notifications are paused.\n\nUse `!pause off` to resume notifications"
    );

    f.registry
        .apply_state(&entity("binary_sensor.dvere_garage"), "on")
        .await;
    assert_eq!(
        f.run(&[]).await,
        "⚠️ **Door sensor notifications are PARTIALLY PAUSED**\n\n3 door(s) are currently open:\n• 2 have notifications paused\n• 1 have notifications active\n\nUse `!pause on` to pause all\nUse `!pause off` to resume all"
    );
}

#[tokio::test]
async fn test_pause_on_and_off() {
    let f = PauseFixture::with_open(&["binary_sensor.dvere_front"]).await;

    let paused = "🚫 **Door sensor notifications PAUSED**\n\nNotifications have been paused for 1 currently open door(s).\n\nThese doors will continue to be tracked but won't send notifications until you resume them or they close naturally.";
    assert_eq!(f.run(&["on"]).await, paused);
    // Nothing left to pause
    assert_eq!(
        f.run(&["STOP"]).await,
        "ℹ️ **No doors to pause**\n\nThere are no currently open doors to pause notifications for. (Total open: 1)"
    );
    assert_eq!(f.registry.status().await.paused, 1);

    assert_eq!(
        f.run(&["off"]).await,
        "✅ **Door sensor notifications RESUMED**\n\nNotifications have been resumed for all 1 currently open door(s)."
    );
    assert_eq!(f.registry.status().await.paused, 0);
}

#[tokio::test]
async fn test_pause_reports_only_newly_paused_doors() {
    let f = PauseFixture::with_open(&["binary_sensor.dvere_front"]).await;
    f.registry.pause().await;
    f.registry
        .apply_state(&entity("binary_sensor.dvere_back"), "on")
        .await;

    assert_eq!(
        f.run(&["on"]).await,
        "🚫 **Door sensor notifications PAUSED**\n\nNotifications have been paused for 1 currently open door(s).\n\nThese doors will continue to be tracked but won't send notifications until you resume them or they close naturally."
    );
    assert_eq!(
        f.run(&["off"]).await,
        "✅ **Door sensor notifications RESUMED**\n\nNotifications have been resumed for all 2 currently open door(s)."
    );
}

#[tokio::test]
async fn test_pause_with_nothing_open() {
    let f = PauseFixture::with_open(&[]).await;
    assert_eq!(
        f.run(&["pause"]).await,
        "ℹ️ **No doors to pause**\n\nThere are no currently open doors to pause notifications for. (Total open: 0)"
    );
    assert_eq!(
        f.run(&["resume"]).await,
        "ℹ️ **No doors to resume**\n\nThere are no currently open doors to resume notifications for."
    );
}

#[tokio::test]
async fn test_pause_invalid_action() {
    let f = PauseFixture::with_open(&[]).await;
    assert_eq!(
        f.run(&["Maybe"]).await,
        "❌ **Invalid action: `maybe`**\n\nValid actions:\n• `!pause on` - Pause notifications for currently open doors\n• `!pause off` - Resume notifications for currently open doors\n• `!pause` - Show current status"
    );
}

// =============================================================================
// state
// =============================================================================

struct FixedStates(Result<Vec<State>, fn() -> HubError>);

#[async_trait]
impl StateSource for FixedStates {
    async fn get_states(&self) -> HubResult<Vec<State>> {
        match &self.0 {
            Ok(states) => Ok(states.clone()),
            Err(make) => Err(make()),
        }
    }
}

async fn run_state(source: FixedStates) -> String {
    let sink = MemorySink::new();
    let command = StateCommand::new(Arc::new(source), "binary_sensor.dvere_");
    command
        .execute(&sink, &user_message("1", CHANNEL, "!state"), &[])
        .await
        .unwrap();
    sink.sent_texts().await.pop().unwrap()
}

#[tokio::test]
async fn test_state_lists_matching_sensors() {
    let states = vec![
        State::new(entity("binary_sensor.dvere_front"), "on"),
        State::new(entity("light.kitchen"), "off"),
        State::new(entity("binary_sensor.dvere_back"), "off"),
    ];
    assert_eq!(
        run_state(FixedStates(Ok(states))).await,
        "**Home Assistant States (binary_sensor.dvere_):**\n\
         - `binary_sensor.dvere_front`: `on`\n\
         - `binary_sensor.dvere_back`: `off`\n"
    );
}

#[tokio::test]
async fn test_state_without_matches() {
    let states = vec![State::new(entity("light.kitchen"), "off")];
    assert_eq!(
        run_state(FixedStates(Ok(states))).await,
        "**Home Assistant States (binary_sensor.dvere_):**\nNo matching entities found.\n"
    );
}

#[tokio::test]
async fn test_state_failures() {
    fn rejected() -> HubError {
        HubError::Request {
            code: "unknown_error".to_string(),
            message: "x".to_string(),
        }
    }
    fn timed_out() -> HubError {
        HubError::Timeout {
            id: 7,
            after: Duration::from_secs(5),
        }
    }

    assert_eq!(
        run_state(FixedStates(Err(rejected))).await,
        "Failed to get states: x"
    );
    assert_eq!(
        run_state(FixedStates(Err(timed_out))).await,
        "Timeout waiting for Home Assistant states."
    );
    assert_eq!(
        run_state(FixedStates(Err(|| HubError::Closed))).await,
        "Error fetching states from Home Assistant."
    );
}

// =============================================================================
// clear
// =============================================================================

async fn seeded(messages: impl IntoIterator<Item = ChatMessage>) -> MemorySink {
    let sink = MemorySink::new();
    for message in messages {
        sink.seed(message).await;
    }
    sink
}

async fn run_clear(sink: &dyn ChatSink, command_id: &str) {
    let command = ClearCommand::new(CHANNEL).with_pace(Duration::ZERO);
    let message = user_message(command_id, CHANNEL, "!clear");
    command.execute(sink, &message, &[]).await.unwrap();
}

#[tokio::test]
async fn test_clear_pages_through_recent_history() {
    let sink = seeded((1..=250).map(|id| aged(id, 0))).await;
    let command = user_message(&sink.allocate_id(), CHANNEL, "!clear");
    sink.seed(command.clone()).await;

    run_clear(&sink, &command.id).await;

    let bulk_sizes: Vec<usize> = sink.bulk_deletes().await.iter().map(Vec::len).collect();
    assert_eq!(bulk_sizes, vec![100, 100, 50]);
    assert!(sink.single_deletes().await.is_empty());
    assert_eq!(
        sink.sent_texts().await,
        vec![
            "Starting to clear channel...",
            "Finished clearing channel. Deleted 250 messages.",
        ]
    );
    // The command and the bot's own replies survive
    assert_eq!(sink.remaining_ids().await.len(), 3);
    assert!(sink.remaining_ids().await.contains(&command.id));
}

#[tokio::test]
async fn test_clear_deletes_old_messages_one_by_one() {
    let old = (1..=10).map(|id| aged(id, 30));
    let recent = (11..=15).map(|id| aged(id, 1));
    let sink = seeded(old.chain(recent)).await;

    run_clear(&sink, "500").await;

    assert_eq!(
        sink.bulk_deletes().await,
        vec![(11..=15).rev().map(|id| id.to_string()).collect::<Vec<_>>()]
    );
    assert_eq!(sink.single_deletes().await.len(), 10);
    assert_eq!(
        sink.sent_texts().await.last().unwrap(),
        "Finished clearing channel. Deleted 15 messages."
    );
}

#[tokio::test]
async fn test_clear_only_in_configured_channel() {
    let sink = seeded((1..=3).map(|id| aged(id, 0))).await;
    let command = ClearCommand::new(CHANNEL).with_pace(Duration::ZERO);

    command
        .execute(&sink, &user_message("10", "77", "!clear"), &[])
        .await
        .unwrap();

    assert_eq!(
        sink.sent().await,
        vec![(
            "77".to_string(),
            "This command can only be used in the configured channel: <#42>".to_string()
        )]
    );
    assert_eq!(sink.remaining_ids().await.len(), 4);
}

/// Delegates sends to a memory sink but fails history or bulk calls
struct BrokenHistory {
    inner: MemorySink,
    fail_list: bool,
}

#[async_trait]
impl ChatSink for BrokenHistory {
    async fn send_text(&self, channel_id: &str, text: &str) -> ChatResult<ChatMessage> {
        self.inner.send_text(channel_id, text).await
    }

    async fn list_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> ChatResult<Vec<ChatMessage>> {
        if self.fail_list {
            return Err(ChatError::Api {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.inner.list_messages(channel_id, limit, before).await
    }

    async fn delete_messages_bulk(&self, _channel_id: &str, _ids: &[String]) -> ChatResult<()> {
        Err(ChatError::Api {
            status: 403,
            body: "nope".to_string(),
        })
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ChatResult<()> {
        self.inner.delete_message(channel_id, message_id).await
    }
}

#[tokio::test]
async fn test_clear_reports_fetch_failure() {
    let sink = BrokenHistory {
        inner: MemorySink::new(),
        fail_list: true,
    };
    run_clear(&sink, "500").await;
    assert_eq!(
        sink.inner.sent_texts().await,
        vec!["Starting to clear channel...", "Error fetching messages."]
    );
}

#[tokio::test]
async fn test_clear_reports_bulk_failure() {
    let sink = BrokenHistory {
        inner: seeded((1..=3).map(|id| aged(id, 0))).await,
        fail_list: false,
    };
    run_clear(&sink, "500").await;
    assert_eq!(
        sink.inner.sent_texts().await,
        vec!["Starting to clear channel...", "Error bulk deleting messages."]
    );
}

#[tokio::test(start_paused = true)]
async fn test_clear_paces_single_deletes() {
    let sink = seeded((1..=3).map(|id| aged(id, 30))).await;
    let command = ClearCommand::new(CHANNEL);
    let started = tokio::time::Instant::now();

    command
        .execute(&sink, &user_message("500", CHANNEL, "!clear"), &[])
        .await
        .unwrap();

    // One pause per single delete plus one after the page
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(sink.single_deletes().await.len(), 3);
}
