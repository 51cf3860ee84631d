//! Settings type definitions.
//!
//! JSON field names are camelCase. Every struct carries `#[serde(default)]`
//! so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "channel": { "maxHistory": 100 },
///   "relay": { "idleTimeoutMs": 60000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Pipeline, history and naming behaviour.
    pub channel: ChannelSettings,
    /// Connection handling.
    pub relay: RelaySettings,
    /// Network binding.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Shortest accepted display-name cap. Leaves room for a one-character stem
/// plus a numeric suffix when fallback names collide.
pub const MIN_NAME_LENGTH: usize = 8;

impl ParleySettings {
    /// Reject values the channel cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.channel.max_history == 0 {
            return Err(SettingsError::InvalidValue {
                key: "channel.maxHistory",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.channel.history_retain_ratio > 0.0 && self.channel.history_retain_ratio <= 1.0)
        {
            return Err(SettingsError::InvalidValue {
                key: "channel.historyRetainRatio",
                reason: format!("{} is outside (0, 1]", self.channel.history_retain_ratio),
            });
        }
        if self.channel.max_name_length < MIN_NAME_LENGTH {
            return Err(SettingsError::InvalidValue {
                key: "channel.maxNameLength",
                reason: format!("must be at least {MIN_NAME_LENGTH}"),
            });
        }
        if self.relay.idle_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue {
                key: "relay.idleTimeoutMs",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Channel behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// History length that triggers a trim.
    pub max_history: usize,
    /// Fraction of `max_history` kept after a trim.
    pub history_retain_ratio: f64,
    /// Longest accepted display name, in characters.
    pub max_name_length: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            max_history: 50,
            history_retain_ratio: 0.7,
            max_name_length: 30,
        }
    }
}

/// Connection relay behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Close a connection after this long without inbound traffic.
    pub idle_timeout_ms: u64,
    /// Deepest payload nesting inspected before a frame is refused.
    pub max_payload_depth: usize,
    /// Outbound frames buffered per connection before drops.
    pub send_queue: usize,
    /// Largest accepted inbound frame.
    pub max_frame_bytes: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 300_000,
            max_payload_depth: 32,
            send_queue: 256,
            max_frame_bytes: 64 * 1024,
        }
    }
}

/// Network binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free one).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
