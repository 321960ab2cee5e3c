use anyhow::Context;
use bus::{topics, BusConsumer, NatsBus};
use gateway::{create_router, run_confirmation_consumer, AppState, Correlator, GatewayConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::product::ProductRegistry;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Gateway API service");

    let config = GatewayConfig::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        bus_url = %config.bus_url,
        order_timeout_ms = config.order_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    // Products are loaded once, before any request is served
    let products = ProductRegistry::parse(&config.product_ids)
        .context("loading product registry")?;
    info!(count = products.len(), "Product registry loaded");

    let bus = Arc::new(NatsBus::connect(&config.bus_url).await?);
    let correlator = Arc::new(Correlator::new(bus.clone(), config.correlator_config()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let confirmations = bus.consume(topics::ORDER_CONFIRMATION).await?;
    let consumer_handle = tokio::spawn(run_confirmation_consumer(
        correlator.clone(),
        confirmations,
        shutdown_rx.clone(),
    ));
    let reaper_handle = tokio::spawn(correlator.clone().run_reaper(shutdown_rx));

    // Create router
    let state = AppState::new(correlator, products, &config.jwt_secret);
    let app = create_router(state);

    // Bind and serve
    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background tasks...");
    let _ = shutdown_tx.send(true);
    for handle in [consumer_handle, reaper_handle] {
        if let Err(e) = handle.await {
            error!("Background task failed: {:?}", e);
        }
    }

    info!("Gateway stopped");
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
