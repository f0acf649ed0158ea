//! # chat-common
//!
//! Shared utilities for the gateway client: configuration and telemetry.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppSettings, BufferSettings, ClientSettings, ConfigError, Environment, GatewaySettings,
    HeartbeatSettings, OverflowSetting, ReconnectSettings,
};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
