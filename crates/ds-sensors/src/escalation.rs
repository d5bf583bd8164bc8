//! Periodic escalation pass

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ds_chat::ChatSink;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::registry::{EscalationPolicy, SensorRegistry};

/// Scans the registry every poll interval and sends due notifications
pub struct EscalationClock {
    registry: Arc<SensorRegistry>,
    sink: Arc<dyn ChatSink>,
    channel_id: String,
    policy: EscalationPolicy,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EscalationClock {
    pub fn new(
        registry: Arc<SensorRegistry>,
        sink: Arc<dyn ChatSink>,
        channel_id: impl Into<String>,
        policy: EscalationPolicy,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registry,
            sink,
            channel_id: channel_id.into(),
            policy,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start ticking in a background task
    ///
    /// The first pass runs one poll interval after start. Returns `None` if
    /// the clock is already running.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Escalation clock already running");
            return None;
        }

        info!(poll = ?self.policy.poll_interval, "Starting escalation clock");
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let registry = self.registry.clone();
        let sink = self.sink.clone();
        let channel_id = self.channel_id.clone();
        let policy = self.policy;
        let running = self.running.clone();
        let period = policy.poll_interval;
        let first = Instant::now() + period;

        Some(tokio::spawn(async move {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::pass(&registry, sink.as_ref(), &channel_id, &policy).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("Escalation clock stopped");
        }))
    }

    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        info!("Stopping escalation clock");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a single pass immediately
    pub async fn run_once(&self) {
        Self::pass(&self.registry, self.sink.as_ref(), &self.channel_id, &self.policy).await;
    }

    async fn pass(
        registry: &SensorRegistry,
        sink: &dyn ChatSink,
        channel_id: &str,
        policy: &EscalationPolicy,
    ) {
        // Decided under the registry lock, sent after it is released
        let due = registry.tick(policy).await;
        for escalation in due {
            debug!(entity_id = %escalation.entity_id(), ?escalation, "Sending escalation");
            if let Err(e) = sink.send_text(channel_id, &escalation.message()).await {
                warn!(entity_id = %escalation.entity_id(), error = %e, "Failed to send notification");
            }
        }
    }
}
