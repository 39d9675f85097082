mod app;
mod bootstrap;
mod chat;
mod demo;
mod error;
mod health;
mod slack_events;

use std::time::Duration;

use anyhow::{Context, Result};
use circuitops_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use circuitops_core::config::LogFormat::*;

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
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;

    let sweeper = bootstrap::spawn_sweeper(
        app.limiters.clone(),
        Duration::from_secs(app.config.rate_limit.sweep_interval_secs),
    );

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        signatures_verified = app.state.readiness.signatures_verified,
        "circuitops-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let (signalled, on_signal) = oneshot::channel();
    let router = app::router(app.state);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown(signalled)).await
    });

    tokio::select! {
        result = &mut server => result?.context("http server terminated unexpectedly")?,
        _ = on_signal => {
            // Detached event chains are not awaited; whatever is still
            // running after the grace window is dropped with the runtime.
            if tokio::time::timeout(grace, &mut server).await.is_err() {
                tracing::warn!(
                    event_name = "system.server.shutdown_timeout",
                    correlation_id = "shutdown",
                    grace_secs = grace.as_secs(),
                    "graceful shutdown window elapsed"
                );
                server.abort();
            }
        }
    }
    sweeper.abort();

    Ok(())
}

async fn wait_for_shutdown(signalled: oneshot::Sender<()>) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "circuitops-server stopping"
    );
    let _ = signalled.send(());
}
