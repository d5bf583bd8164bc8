//! Configuration for door-sentry
//!
//! Everything comes from environment variables:
//!
//! | variable | default |
//! |---|---|
//! | `DISCORD_TOKEN` | required |
//! | `BOT_PREFIX` | `!` |
//! | `HASS_URL` | required, `ws://` or `wss://` |
//! | `HASS_TOKEN` | required |
//! | `CHANNEL_ID` | required |
//! | `SENSOR_ON_TIMEOUT` | `15` seconds |
//! | `SENSOR_ON_TIMEOUT_REMINDER` | `60` seconds |
//! | `SENSOR_PREFIX` | `binary_sensor.dvere_` |
//!
//! An unparseable timeout logs a warning and falls back to its default.

mod error;

use std::fmt;
use std::time::Duration;

use tracing::warn;

pub use error::{ConfigError, ConfigResult};

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_SENSOR_PREFIX: &str = "binary_sensor.dvere_";
pub const DEFAULT_SENSOR_ON_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_SENSOR_ON_TIMEOUT_REMINDER_SECS: u64 = 60;

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub discord_token: String,
    /// Command prefix
    pub prefix: String,
    /// Hub websocket endpoint, e.g. `ws://homeassistant.local:8123/api/websocket`
    pub hass_url: String,
    pub hass_token: String,
    /// The one channel notifications go to and `clear` works in
    pub channel_id: String,
    /// Open time before the first alert
    pub sensor_on_timeout: Duration,
    /// Gap between reminders
    pub sensor_on_timeout_reminder: Duration,
    /// Entity id prefix of tracked door sensors
    pub sensor_prefix: String,
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &str| -> ConfigResult<String> {
            match lookup(var) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(ConfigError::EnvVarNotFound {
                    var: var.to_string(),
                }),
            }
        };
        let optional = |var: &str, default: &str| lookup(var).unwrap_or_else(|| default.to_string());

        let hass_url = required("HASS_URL")?;
        if !(hass_url.starts_with("ws://") || hass_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "HASS_URL".to_string(),
                reason: format!("expected a ws:// or wss:// URL, got '{}'", hass_url),
            });
        }

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            prefix: optional("BOT_PREFIX", DEFAULT_PREFIX),
            hass_url,
            hass_token: required("HASS_TOKEN")?,
            channel_id: required("CHANNEL_ID")?,
            sensor_on_timeout: seconds(
                "SENSOR_ON_TIMEOUT",
                lookup("SENSOR_ON_TIMEOUT"),
                DEFAULT_SENSOR_ON_TIMEOUT_SECS,
            ),
            sensor_on_timeout_reminder: seconds(
                "SENSOR_ON_TIMEOUT_REMINDER",
                lookup("SENSOR_ON_TIMEOUT_REMINDER"),
                DEFAULT_SENSOR_ON_TIMEOUT_REMINDER_SECS,
            ),
            sensor_prefix: optional("SENSOR_PREFIX", DEFAULT_SENSOR_PREFIX),
        })
    }
}

fn seconds(var: &str, value: Option<String>, default: u64) -> Duration {
    let Some(value) = value else {
        return Duration::from_secs(default);
    };
    match value.trim().parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => {
            warn!(var, value = %value, default, "Invalid timeout value, using default");
            Duration::from_secs(default)
        }
    }
}

// Tokens stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field("prefix", &self.prefix)
            .field("hass_url", &self.hass_url)
            .field("hass_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("sensor_on_timeout", &self.sensor_on_timeout)
            .field("sensor_on_timeout_reminder", &self.sensor_on_timeout_reminder)
            .field("sensor_prefix", &self.sensor_prefix)
            .finish()
    }
}
