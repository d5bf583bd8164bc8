//! Notification texts

use ds_core::EntityId;
use std::time::Duration;

pub fn initial_alert(entity_id: &EntityId, timeout: Duration) -> String {
    format!(
        "Door `{}` has been open for more than {} seconds! @everyone",
        entity_id.object_id(),
        timeout.as_secs()
    )
}

pub fn reminder(entity_id: &EntityId, open_for: Duration) -> String {
    format!(
        "Reminder: Door `{}` is still open (open for {})! @everyone",
        entity_id.object_id(),
        format_duration(open_for)
    )
}

pub fn expired(entity_id: &EntityId) -> String {
    format!(
        "Door `{}` has been open for over an hour. Stopping reminders.",
        entity_id.object_id()
    )
}

pub fn closed(entity_id: &EntityId) -> String {
    format!("Door `{}` is now closed.", entity_id.object_id())
}

/// Render a duration rounded to whole seconds, e.g. `45s`, `1m15s`, `1h0m0s`
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if duration.subsec_nanos() >= 500_000_000 {
        secs += 1;
    }

    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
