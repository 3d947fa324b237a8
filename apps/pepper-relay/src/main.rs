use anyhow::{Context, Result};
use clap::Parser;
use pepper_relay::{relay_router, static_router, Cli, ClientRegistry, RelayConfig, RelayState};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = pepper_relay::telemetry::Telemetry::init()?;

    let config = RelayConfig::try_from(Cli::parse())?;
    info!(
        http_addr = %config.http_addr,
        relay_addr = %config.relay_addr,
        static_dir = %config.static_dir.display(),
        "starting pepper-relay"
    );

    let state = RelayState::new(
        ClientRegistry::new(),
        telemetry.metrics_handle(),
    );

    let relay_listener = tokio::net::TcpListener::bind(config.relay_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.relay_addr))?;
    let http_listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind http listener on {}", config.http_addr))?;
    info!("relay listening on ws://{}", config.relay_addr);
    info!("static files on http://{}", config.http_addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let relay = axum::serve(relay_listener, relay_router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown_rx.clone()));
    let http = axum::serve(http_listener, static_router(&config.static_dir))
        .with_graceful_shutdown(shutdown_signal(shutdown_rx));
    tokio::try_join!(
        async { relay.await.context("relay server shutdown with error") },
        async { http.await.context("http server shutdown with error") },
    )?;

    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        "shutdown signal received; sleeping for graceful period"
    );
    tokio::time::sleep(config.shutdown_grace).await;
    info!("graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
