mod bootstrap;
mod echo;
mod health;
mod oauth;
mod webhook;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::Router;
use tracing_subscriber::EnvFilter;
use turnwire_core::config::{AppConfig, LoadOptions};

use crate::{bootstrap::Application, echo::EchoBot, health::HealthState, webhook::WebhookState};

fn init_logging(config: &AppConfig) {
    use turnwire_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
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
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let router = build_router(&app);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        webhook_path = %app.config.server.webhook_path,
        "turnwire-server listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "draining in-flight requests"
    );
    let _ = stop_tx.send(());

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish before the grace period"
        ),
    }
    Ok(())
}

fn build_router(app: &Application) -> Router {
    let webhook = WebhookState { dispatcher: Arc::clone(&app.dispatcher), bot: Arc::new(EchoBot) };
    let mut router = webhook::router(&app.config.server.webhook_path, webhook).merge(
        health::router(HealthState {
            multi_tenant: app.dispatcher.multi_tenant(),
            signature_enforced: app.dispatcher.signature_enforced(),
        }),
    );
    if let Some(installer) = &app.installer {
        router = router.merge(oauth::router(Arc::clone(installer)));
    }
    router
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
