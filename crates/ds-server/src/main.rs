//! door-sentry
//!
//! Watches Home Assistant door sensors and nags a Discord channel about
//! doors left open.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ds_chat::{ChatSink, DiscordGateway, DiscordRest};
use ds_commands::{ClearCommand, Dispatcher, PauseCommand, PingCommand, StateCommand};
use ds_config::Config;
use ds_core::events::STATE_CHANGED;
use ds_hub::HubClient;
use ds_sensors::{EscalationClock, EscalationPolicy, EventIngestor, SensorRegistry, SystemClock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for the event feed to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn escalation_policy(config: &Config) -> EscalationPolicy {
    EscalationPolicy::new(config.sensor_on_timeout, config.sensor_on_timeout_reminder)
}

fn build_dispatcher(
    config: &Config,
    sink: Arc<dyn ChatSink>,
    hub: &HubClient,
    registry: Arc<SensorRegistry>,
) -> Dispatcher {
    Dispatcher::new(&config.prefix, sink)
        .with(PingCommand)
        .with(StateCommand::new(Arc::new(hub.clone()), &config.sensor_prefix))
        .with(PauseCommand::new(registry, &config.prefix))
        .with(ClearCommand::new(&config.channel_id))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting door-sentry");

    let config = Config::from_env().context("failed to load configuration")?;
    debug!(?config, "Loaded configuration");

    // Hub connection and event feed
    let (hub, listener) = HubClient::connect(&config.hass_url, &config.hass_token)
        .await
        .context("failed to connect to Home Assistant")?;
    let mut listener_task = tokio::spawn(listener.run());
    let events = hub
        .subscribe_events(Some(STATE_CHANGED))
        .await
        .context("failed to subscribe to state changes")?;

    // Sensor tracking
    let sink: Arc<dyn ChatSink> = Arc::new(DiscordRest::new(&config.discord_token));
    let registry = Arc::new(SensorRegistry::new(Arc::new(SystemClock)));
    let ingestor = EventIngestor::new(
        registry.clone(),
        sink.clone(),
        &config.channel_id,
        &config.sensor_prefix,
    );
    let ingestor_task = tokio::spawn(ingestor.run(events));
    let escalation = EscalationClock::new(
        registry.clone(),
        sink.clone(),
        &config.channel_id,
        escalation_policy(&config),
    );
    escalation.start();

    // Chat commands
    let dispatcher = Arc::new(build_dispatcher(&config, sink, &hub, registry));
    let (messages_tx, messages_rx) = mpsc::channel(32);
    tokio::spawn(dispatcher.run(messages_rx));
    let gateway = DiscordGateway::new(&config.discord_token);
    let mut gateway_task = tokio::spawn(async move { gateway.run(messages_tx).await });

    info!(
        channel_id = %config.channel_id,
        sensor_prefix = %config.sensor_prefix,
        "door-sentry is running"
    );

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            signal.context("failed to listen for Ctrl-C")
        }
        stopped = &mut listener_task => match stopped {
            Ok(reason) => {
                error!(error = %reason, "Home Assistant connection lost");
                Err(anyhow::Error::new(reason).context("Home Assistant connection lost"))
            }
            Err(e) => Err(anyhow::Error::new(e).context("hub receive loop panicked")),
        },
        stopped = &mut gateway_task => match stopped {
            Ok(Ok(())) => Err(anyhow!("Discord gateway stopped")),
            Ok(Err(e)) => {
                error!(error = %e, "Discord gateway failed");
                Err(anyhow::Error::new(e).context("Discord gateway failed"))
            }
            Err(e) => Err(anyhow::Error::new(e).context("Discord gateway panicked")),
        },
    };

    escalation.stop();
    gateway_task.abort();
    if let Err(e) = hub.close().await {
        warn!(error = %e, "Failed to close hub connection cleanly");
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, ingestor_task).await.is_err() {
        warn!("Event ingestor did not stop in time");
    }

    info!("door-sentry stopped");
    outcome
}
