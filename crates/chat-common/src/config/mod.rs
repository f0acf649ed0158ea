//! Configuration structs

mod app_config;

pub use app_config::{
    AppSettings, BufferSettings, ClientSettings, ConfigError, Environment, GatewaySettings,
    HeartbeatSettings, OverflowSetting, ReconnectSettings,
};
