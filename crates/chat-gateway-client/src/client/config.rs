//! Client configuration

use crate::buffer::BufferConfig;
use crate::connection::ConnectionConfig;
use crate::heartbeat::HeartbeatConfig;
use chat_common::ClientSettings;

/// Capacity of the lifecycle notification channel
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Gateway client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// `ws://` or `wss://` gateway endpoint
    pub url: String,
    /// Bot token, sent as `Authorization: Bot <token>`
    pub token: String,
    pub connection: ConnectionConfig,
    pub heartbeat: HeartbeatConfig,
    pub buffer: BufferConfig,
    /// Notifications a slow listener may fall behind by before lagging
    pub event_capacity: usize,
}

impl ClientConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            connection: ConnectionConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            buffer: BufferConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    #[must_use]
    pub fn with_buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            url: settings.gateway.url.clone(),
            token: settings.gateway.token.clone(),
            connection: ConnectionConfig::from(settings),
            heartbeat: HeartbeatConfig::from(&settings.heartbeat),
            buffer: BufferConfig::from(&settings.buffer),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("connection", &self.connection)
            .field("heartbeat", &self.heartbeat)
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_common::{
        AppSettings, BufferSettings, Environment, GatewaySettings, HeartbeatSettings,
        OverflowSetting, ReconnectSettings,
    };
    use std::time::Duration;

    fn settings() -> ClientSettings {
        ClientSettings {
            app: AppSettings {
                name: "test".to_string(),
                env: Environment::Development,
            },
            gateway: GatewaySettings {
                url: "ws://127.0.0.1:1/gateway".to_string(),
                token: "secret-token".to_string(),
                connect_timeout_ms: 2_000,
            },
            heartbeat: HeartbeatSettings {
                interval_ms: 500,
                slack_ms: 50,
            },
            reconnect: ReconnectSettings {
                base_delay_ms: 10,
                max_delay_ms: 100,
                jitter_ms: 2,
                resume_max_attempts: 5,
            },
            buffer: BufferSettings {
                capacity: 4,
                overflow: OverflowSetting::Drop,
                gap_timeout_ms: None,
            },
        }
    }

    #[test]
    fn test_from_settings() {
        let config = ClientConfig::from(&settings());

        assert_eq!(config.connection.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.connection.backoff.max, Duration::from_millis(100));
        assert_eq!(config.connection.resume_max_attempts, 5);
        assert_eq!(config.heartbeat.interval, Duration::from_millis(500));
        assert_eq!(config.buffer.capacity, 4);
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", ClientConfig::from(&settings()));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("REDACTED"));
    }
}
