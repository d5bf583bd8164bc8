//! In-memory table of open door sensors
//!
//! One entry per sensor currently reporting "on". The escalation pass and
//! the pause operations all run under the same lock; callers get back
//! decisions and do their messaging after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ds_core::{EntityId, STATE_ON};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::clock::Clock;
use crate::message;

/// Timing of the escalation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Open time before the first alert
    pub initial_timeout: Duration,
    /// Minimum gap between reminders
    pub reminder_interval: Duration,
    /// Open time after which tracking stops
    pub expiry_window: Duration,
    /// How often the registry is scanned
    pub poll_interval: Duration,
}

impl EscalationPolicy {
    pub fn new(initial_timeout: Duration, reminder_interval: Duration) -> Self {
        Self {
            initial_timeout,
            reminder_interval,
            ..Self::default()
        }
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_secs(15),
            reminder_interval: Duration::from_secs(60),
            expiry_window: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Tracking state for one open sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEntry {
    pub open_since: DateTime<Utc>,
    /// Unset until the initial alert is due
    pub last_notified_at: Option<DateTime<Utc>>,
    pub paused: bool,
}

impl SensorEntry {
    fn opened_at(now: DateTime<Utc>) -> Self {
        Self {
            open_since: now,
            last_notified_at: None,
            paused: false,
        }
    }

    pub fn is_notified(&self) -> bool {
        self.last_notified_at.is_some()
    }
}

/// Effect of a state change on the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new entry was created
    Opened,
    /// The sensor was already tracked; nothing changed
    StillOpen,
    /// The entry was removed
    Closed { notified: bool },
    /// Not "on" and not tracked
    Ignored,
}

/// A notification due for one sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    Initial {
        entity_id: EntityId,
        timeout: Duration,
    },
    Reminder {
        entity_id: EntityId,
        open_for: Duration,
    },
    Expired {
        entity_id: EntityId,
    },
}

impl Escalation {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Escalation::Initial { entity_id, .. }
            | Escalation::Reminder { entity_id, .. }
            | Escalation::Expired { entity_id } => entity_id,
        }
    }

    /// The chat text for this notification
    pub fn message(&self) -> String {
        match self {
            Escalation::Initial { entity_id, timeout } => message::initial_alert(entity_id, *timeout),
            Escalation::Reminder {
                entity_id,
                open_for,
            } => message::reminder(entity_id, *open_for),
            Escalation::Expired { entity_id } => message::expired(entity_id),
        }
    }
}

/// Snapshot of pause flags across open sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseStatus {
    pub total: usize,
    pub paused: usize,
}

/// Outcome of a pause or resume, taken under the same lock as the change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseChange {
    /// Entries whose flag flipped
    pub changed: usize,
    pub status: PauseStatus,
}

/// Four-way reading of a [`PauseStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseSummary {
    NoneOpen,
    AllActive,
    AllPaused,
    Mixed,
}

impl PauseStatus {
    pub fn active(&self) -> usize {
        self.total - self.paused
    }

    pub fn summary(&self) -> PauseSummary {
        if self.total == 0 {
            PauseSummary::NoneOpen
        } else if self.paused == 0 {
            PauseSummary::AllActive
        } else if self.paused == self.total {
            PauseSummary::AllPaused
        } else {
            PauseSummary::Mixed
        }
    }
}

/// The table of open sensors
pub struct SensorRegistry {
    entries: Mutex<HashMap<EntityId, SensorEntry>>,
    clock: Arc<dyn Clock>,
}

impl SensorRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Apply a sensor's new state value
    ///
    /// `"on"` starts tracking unless already tracked; any other value stops
    /// tracking. Re-opening after a close starts a fresh entry.
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn apply_state(&self, entity_id: &EntityId, state: &str) -> Transition {
        let mut entries = self.entries.lock().await;

        if state == STATE_ON {
            if entries.contains_key(entity_id) {
                return Transition::StillOpen;
            }
            entries.insert(entity_id.clone(), SensorEntry::opened_at(self.clock.now()));
            info!("Door opened, tracking");
            return Transition::Opened;
        }

        match entries.remove(entity_id) {
            Some(entry) => {
                info!(state, notified = entry.is_notified(), "Door closed, stopped tracking");
                Transition::Closed {
                    notified: entry.is_notified(),
                }
            }
            None => Transition::Ignored,
        }
    }

    /// Run one escalation pass over every entry
    ///
    /// Timestamps advance and expired entries are removed whether or not
    /// the entry is paused; only unpaused notifications are returned.
    #[instrument(skip(self, policy))]
    pub async fn tick(&self, policy: &EscalationPolicy) -> Vec<Escalation> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let mut due = Vec::new();

        entries.retain(|entity_id, entry| {
            let open_for = (now - entry.open_since).to_std().unwrap_or_default();

            let escalation = match entry.last_notified_at {
                None if open_for >= policy.initial_timeout => {
                    entry.last_notified_at = Some(now);
                    Escalation::Initial {
                        entity_id: entity_id.clone(),
                        timeout: policy.initial_timeout,
                    }
                }
                _ if open_for >= policy.expiry_window => Escalation::Expired {
                    entity_id: entity_id.clone(),
                },
                None => return true,
                Some(last) => {
                    let since_last = (now - last).to_std().unwrap_or_default();
                    if since_last < policy.reminder_interval {
                        return true;
                    }
                    entry.last_notified_at = Some(now);
                    Escalation::Reminder {
                        entity_id: entity_id.clone(),
                        open_for,
                    }
                }
            };

            if entry.paused {
                debug!(entity_id = %entity_id, "Notification suppressed, paused");
            } else {
                due.push(escalation.clone());
            }
            !matches!(escalation, Escalation::Expired { .. })
        });

        due
    }

    /// Pause notifications for every open sensor
    pub async fn pause(&self) -> PauseChange {
        let change = self.set_paused(true).await;
        info!(changed = change.changed, "Paused notifications");
        change
    }

    /// Resume notifications for every open sensor
    pub async fn resume(&self) -> PauseChange {
        let change = self.set_paused(false).await;
        info!(changed = change.changed, "Resumed notifications");
        change
    }

    async fn set_paused(&self, paused: bool) -> PauseChange {
        let mut entries = self.entries.lock().await;
        let mut changed = 0;
        for entry in entries.values_mut().filter(|e| e.paused != paused) {
            entry.paused = paused;
            changed += 1;
        }
        PauseChange {
            changed,
            status: Self::snapshot(&entries),
        }
    }

    pub async fn status(&self) -> PauseStatus {
        Self::snapshot(&*self.entries.lock().await)
    }

    fn snapshot(entries: &HashMap<EntityId, SensorEntry>) -> PauseStatus {
        PauseStatus {
            total: entries.len(),
            paused: entries.values().filter(|e| e.paused).count(),
        }
    }

    pub async fn entry(&self, entity_id: &EntityId) -> Option<SensorEntry> {
        self.entries.lock().await.get(entity_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use ds_core::STATE_OFF;

    fn front() -> EntityId {
        "binary_sensor.dvere_front".parse().unwrap()
    }

    fn back() -> EntityId {
        "binary_sensor.dvere_back".parse().unwrap()
    }

    fn registry() -> (SensorRegistry, MockClock) {
        let clock = MockClock::new();
        (SensorRegistry::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_entry_exists_iff_last_state_was_on() {
        let (registry, _) = registry();

        assert_eq!(registry.apply_state(&front(), STATE_OFF).await, Transition::Ignored);
        assert!(registry.entry(&front()).await.is_none());

        assert_eq!(registry.apply_state(&front(), STATE_ON).await, Transition::Opened);
        assert!(registry.entry(&front()).await.is_some());

        assert_eq!(
            registry.apply_state(&front(), "unavailable").await,
            Transition::Closed { notified: false }
        );
        assert!(registry.entry(&front()).await.is_none());
    }

    #[tokio::test]
    async fn test_repeated_on_keeps_first_entry() {
        let (registry, clock) = registry();

        registry.apply_state(&front(), STATE_ON).await;
        let first = registry.entry(&front()).await.unwrap();

        clock.advance_seconds(30);
        assert_eq!(registry.apply_state(&front(), STATE_ON).await, Transition::StillOpen);
        assert_eq!(registry.entry(&front()).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_reopen_starts_fresh_entry() {
        let (registry, clock) = registry();
        let policy = EscalationPolicy::default();

        registry.apply_state(&front(), STATE_ON).await;
        clock.advance_seconds(20);
        registry.tick(&policy).await;
        assert_eq!(
            registry.apply_state(&front(), STATE_OFF).await,
            Transition::Closed { notified: true }
        );

        clock.advance_seconds(5);
        registry.apply_state(&front(), STATE_ON).await;
        let entry = registry.entry(&front()).await.unwrap();
        assert_eq!(entry.open_since, clock.now());
        assert!(!entry.is_notified());
        assert!(!entry.paused);
    }

    #[tokio::test]
    async fn test_no_reminder_before_initial() {
        let (registry, clock) = registry();
        let policy = EscalationPolicy::default();

        registry.apply_state(&front(), STATE_ON).await;
        for _ in 0..2 {
            clock.advance_seconds(5);
            assert!(registry.tick(&policy).await.is_empty());
        }

        clock.advance_seconds(5);
        let due = registry.tick(&policy).await;
        assert!(matches!(due.as_slice(), [Escalation::Initial { .. }]));
    }

    #[tokio::test]
    async fn test_pause_and_resume_round_trip() {
        let (registry, _) = registry();
        registry.apply_state(&front(), STATE_ON).await;
        registry.apply_state(&back(), STATE_ON).await;

        assert_eq!(registry.status().await.summary(), PauseSummary::AllActive);
        assert_eq!(registry.pause().await.changed, 2);
        assert_eq!(registry.pause().await.changed, 0);
        assert_eq!(registry.status().await, PauseStatus { total: 2, paused: 2 });
        assert_eq!(registry.status().await.summary(), PauseSummary::AllPaused);

        assert_eq!(registry.resume().await.changed, 2);
        assert_eq!(registry.resume().await.changed, 0);
        assert_eq!(registry.status().await, PauseStatus { total: 2, paused: 0 });
    }

    #[tokio::test]
    async fn test_pause_change_matches_snapshot() {
        let (registry, _) = registry();
        registry.apply_state(&front(), STATE_ON).await;
        registry.pause().await;
        registry.apply_state(&back(), STATE_ON).await;

        assert_eq!(
            registry.pause().await,
            PauseChange {
                changed: 1,
                status: PauseStatus { total: 2, paused: 2 },
            }
        );
        assert_eq!(
            registry.resume().await,
            PauseChange {
                changed: 2,
                status: PauseStatus { total: 2, paused: 0 },
            }
        );
    }

    #[tokio::test]
    async fn test_pause_status_summary() {
        assert_eq!(PauseStatus { total: 0, paused: 0 }.summary(), PauseSummary::NoneOpen);
        assert_eq!(PauseStatus { total: 3, paused: 0 }.summary(), PauseSummary::AllActive);
        assert_eq!(PauseStatus { total: 3, paused: 3 }.summary(), PauseSummary::AllPaused);
        let mixed = PauseStatus { total: 3, paused: 1 };
        assert_eq!(mixed.summary(), PauseSummary::Mixed);
        assert_eq!(mixed.active(), 2);
    }

    #[tokio::test]
    async fn test_newly_opened_sensor_is_not_paused() {
        let (registry, _) = registry();
        registry.apply_state(&front(), STATE_ON).await;
        registry.pause().await;

        registry.apply_state(&back(), STATE_ON).await;
        assert_eq!(registry.status().await.summary(), PauseSummary::Mixed);
    }

    #[tokio::test]
    async fn test_paused_expiry_still_removes_entry() {
        let (registry, clock) = registry();
        let policy = EscalationPolicy::default();

        registry.apply_state(&front(), STATE_ON).await;
        clock.advance_seconds(15);
        registry.tick(&policy).await;
        registry.pause().await;

        clock.advance_seconds(3600);
        assert!(registry.tick(&policy).await.is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_expiry_applies_before_initial_alert() {
        let (registry, clock) = registry();
        let policy = EscalationPolicy::new(Duration::from_secs(7200), Duration::from_secs(60));

        registry.apply_state(&front(), STATE_ON).await;
        clock.advance_seconds(3595);
        assert!(registry.tick(&policy).await.is_empty());
        assert!(registry.entry(&front()).await.is_some());

        clock.advance_seconds(5);
        assert_eq!(
            registry.tick(&policy).await,
            vec![Escalation::Expired { entity_id: front() }]
        );
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_never_notified_entry_alerts_then_expires() {
        let (registry, clock) = registry();
        let policy = EscalationPolicy::default();

        registry.apply_state(&front(), STATE_ON).await;
        clock.advance_seconds(4000);
        let due = registry.tick(&policy).await;
        assert!(matches!(due.as_slice(), [Escalation::Initial { .. }]));

        clock.advance_seconds(5);
        assert_eq!(
            registry.tick(&policy).await,
            vec![Escalation::Expired { entity_id: front() }]
        );
        assert!(registry.is_empty().await);
    }
}
