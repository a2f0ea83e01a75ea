mod bootstrap;
mod health;
mod ingress;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use briefly_core::config::{AppConfig, LoadOptions, TransportMode};
use briefly_slack::socket::{ReconnectPolicy, SocketModeRunner, WebSocketTransport};

use crate::health::HealthState;
use crate::ingress::IngressState;

fn init_logging(config: &AppConfig) {
    use briefly_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let server = &app.config.server;

    health::spawn(
        &server.bind_address,
        server.health_check_port,
        HealthState::new(app.gateway.describe(), server.transport),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        transport_mode = server.transport.as_str(),
        gateway = app.gateway.describe(),
        "briefly-server started"
    );

    match server.transport {
        TransportMode::Socket => {
            let transport =
                WebSocketTransport::new(app.slack_api.clone(), app.config.slack.app_token.clone());
            let runner = SocketModeRunner::new(
                Arc::new(transport),
                app.dispatcher.clone(),
                ReconnectPolicy::default(),
            );
            tokio::select! {
                result = runner.start() => result?,
                result = wait_for_shutdown() => result?,
            }
        }
        TransportMode::Http => {
            let signing_secret = app
                .config
                .slack
                .signing_secret
                .clone()
                .ok_or_else(|| anyhow!("slack.signing_secret is required for http transport"))?;
            ingress::spawn(
                &server.bind_address,
                server.events_port,
                IngressState::new(app.dispatcher.clone(), signing_secret),
            )
            .await?;
            wait_for_shutdown().await?;
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "briefly-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
