//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    pub app: AppSettings,
    pub gateway: GatewaySettings,
    pub heartbeat: HeartbeatSettings,
    pub reconnect: ReconnectSettings,
    pub buffer: BufferSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Gateway endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub url: String,
    pub token: String,
    /// Window in which an attempt must signal ready
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Heartbeat configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSettings {
    /// Used when the server's Hello does not advertise an interval
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_heartbeat_slack_ms")]
    pub slack_ms: u64,
}

/// Reconnect backoff and resume configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_resume_max_attempts")]
    pub resume_max_attempts: u32,
}

/// What the event buffer does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowSetting {
    Drop,
    #[default]
    Throw,
}

/// Sequenced event buffer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BufferSettings {
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowSetting,
    /// `None` waits for missing sequences indefinitely
    #[serde(default)]
    pub gap_timeout_ms: Option<u64>,
}

// Default value functions
fn default_app_name() -> String {
    "chat-gateway-client".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_slack_ms() -> u64 {
    1_000
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_resume_max_attempts() -> u32 {
    3
}

fn default_buffer_capacity() -> usize {
    1024
}

impl ClientSettings {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("GATEWAY_URL").ok_or(ConfigError::MissingVar("GATEWAY_URL"))?;
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_URL",
                format!("{url} (must start with ws:// or wss://)"),
            ));
        }

        let heartbeat_interval_ms = parse_or(
            &lookup,
            "GATEWAY_HEARTBEAT_INTERVAL_MS",
            default_heartbeat_interval_ms,
        )?;
        if heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_HEARTBEAT_INTERVAL_MS",
                "0 (must be non-zero)".to_string(),
            ));
        }

        let overflow = match lookup("BUFFER_OVERFLOW_POLICY") {
            None => OverflowSetting::default(),
            Some(s) => match s.to_lowercase().as_str() {
                "drop" => OverflowSetting::Drop,
                "throw" => OverflowSetting::Throw,
                _ => return Err(ConfigError::InvalidValue("BUFFER_OVERFLOW_POLICY", s)),
            },
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            gateway: GatewaySettings {
                url,
                token: lookup("GATEWAY_TOKEN").ok_or(ConfigError::MissingVar("GATEWAY_TOKEN"))?,
                connect_timeout_ms: parse_or(
                    &lookup,
                    "GATEWAY_CONNECT_TIMEOUT_MS",
                    default_connect_timeout_ms,
                )?,
            },
            heartbeat: HeartbeatSettings {
                interval_ms: heartbeat_interval_ms,
                slack_ms: parse_or(&lookup, "GATEWAY_HEARTBEAT_SLACK_MS", default_heartbeat_slack_ms)?,
            },
            reconnect: ReconnectSettings {
                base_delay_ms: parse_or(&lookup, "RECONNECT_BASE_DELAY_MS", default_base_delay_ms)?,
                max_delay_ms: parse_or(&lookup, "RECONNECT_MAX_DELAY_MS", default_max_delay_ms)?,
                jitter_ms: parse_or(&lookup, "RECONNECT_JITTER_MS", default_jitter_ms)?,
                resume_max_attempts: parse_or(
                    &lookup,
                    "RESUME_MAX_ATTEMPTS",
                    default_resume_max_attempts,
                )?,
            },
            buffer: BufferSettings {
                capacity: parse_or(&lookup, "BUFFER_CAPACITY", default_buffer_capacity)?,
                overflow,
                gap_timeout_ms: lookup("BUFFER_GAP_TIMEOUT_MS")
                    .map(|s| {
                        s.parse()
                            .map_err(|_| ConfigError::InvalidValue("BUFFER_GAP_TIMEOUT_MS", s))
                    })
                    .transpose()?,
            },
        })
    }
}

/// Parse an optional variable, falling back to its default when unset
fn parse_or<F, T>(lookup: &F, key: &'static str, default: fn() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue(key, s)),
        None => Ok(default()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
