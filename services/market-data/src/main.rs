use std::sync::Arc;

use anyhow::Context;
use bus::{topics, BusConsumer, NatsBus};
use market_data::{
    create_router, run_event_consumer, AppState, BroadcastHub, Heartbeat, MarketDataConfig,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::product::ProductRegistry;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = market_data::SERVICE_VERSION, "Starting Market Data service");

    let config = MarketDataConfig::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        bus_url = %config.bus_url,
        queue_capacity = config.client_queue_capacity,
        overflow_policy = ?config.overflow_policy,
        "Configuration loaded"
    );

    // Registry is published before any channel exists
    let products = ProductRegistry::parse(&config.product_ids)
        .context("loading product registry")?;
    info!(count = products.len(), "Product registry loaded");

    let hub = Arc::new(BroadcastHub::new(products, config.client_config()));

    let bus = NatsBus::connect(&config.bus_url).await?;
    let events = bus.consume(topics::MARKET_EVENTS).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(run_event_consumer(hub.clone(), events, shutdown_rx.clone()));
    let heartbeat_handle = tokio::spawn(
        Heartbeat::new(hub.clone()).run(config.heartbeat_interval, shutdown_rx),
    );

    let app = create_router(AppState::new(hub, &config.jwt_secret));

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background tasks...");
    let _ = shutdown_tx.send(true);
    for handle in [consumer_handle, heartbeat_handle] {
        if let Err(e) = handle.await {
            error!("Background task failed: {:?}", e);
        }
    }

    info!("Market Data service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
