//! Server configuration.

use std::time::Duration;

use parley_settings::ParleySettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for [`ParleyServer`](crate::server::ParleyServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free one).
    pub port: u16,
    /// Close a connection after this long without inbound frames.
    pub idle_timeout_ms: u64,
    /// Deepest payload nesting accepted from clients.
    pub max_payload_depth: usize,
    /// Outbound frames buffered per connection.
    pub send_queue: usize,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_frame_bytes: usize,
    /// Commands buffered in front of the channel worker.
    pub channel_queue: usize,
}

impl ServerConfig {
    /// Take the relay and binding sections of loaded settings.
    pub fn from_settings(settings: &ParleySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            idle_timeout_ms: settings.relay.idle_timeout_ms,
            max_payload_depth: settings.relay.max_payload_depth,
            send_queue: settings.relay.send_queue,
            max_frame_bytes: settings.relay.max_frame_bytes,
            ..Self::default()
        }
    }

    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            idle_timeout_ms: 300_000,
            max_payload_depth: 32,
            send_queue: 256,
            max_frame_bytes: 64 * 1024,
            channel_queue: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn from_settings_copies_relay_and_server() {
        let mut settings = ParleySettings::default();
        settings.server.port = 9100;
        settings.relay.idle_timeout_ms = 1_500;
        settings.relay.send_queue = 8;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.idle_timeout(), Duration::from_millis(1_500));
        assert_eq!(cfg.send_queue, 8);
        assert_eq!(cfg.max_frame_bytes, 64 * 1024);
        assert_eq!(cfg.channel_queue, 1024);
    }
}
