//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! cargo run -p chat-gateway-client
//! ```
//!
//! Configuration is loaded from environment variables. Received events are
//! logged until Ctrl-C.

use async_trait::async_trait;
use chat_common::{try_init_tracing_with_config, ClientSettings, TracingConfig};
use chat_gateway_client::{ClientConfig, ClientEvent, EventHandler, GatewayClient, GatewayEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

struct LogEvents;

#[async_trait]
impl EventHandler for LogEvents {
    async fn on_event(&self, event: GatewayEvent) -> anyhow::Result<()> {
        info!(
            sequence = event.sequence,
            event_type = event.event_type.as_deref().unwrap_or("-"),
            "Event received"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let settings = match ClientSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(settings.app.env))
    {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(&settings).await {
        error!(error = %format!("{e:#}"), "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run(settings: &ClientSettings) -> anyhow::Result<()> {
    let config = ClientConfig::from(settings);
    info!(
        name = %settings.app.name,
        env = ?settings.app.env,
        url = %config.url,
        "Configuration loaded"
    );

    let client = GatewayClient::new(config, Arc::new(LogEvents));
    let mut notifications = client.subscribe();
    client.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            notification = notifications.recv() => match notification {
                Ok(ClientEvent::Disconnected { error, will_reconnect: false }) => {
                    if let Some(e) = error {
                        error!(error = %e, "Gateway connection ended");
                    }
                    break;
                }
                Ok(event) => info!(event = %event, "Client event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Lifecycle listener lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.stop().await;
    info!("Gateway client stopped");
    Ok(())
}
