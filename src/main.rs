//! TV Control Bridge daemon
//!
//! Wiring: discover, reconcile, pair, build control points, start the
//! refresh timers, then run until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tv_control_bridge::{
    bus, config,
    control::build_control_points,
    discovery::{Discovery, SsdpDiscovery},
    pairing::PairingCoordinator,
    registry::DeviceRegistry,
    remote::NetworkRemote,
    scheduler::RefreshScheduler,
    store::DeviceStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tv_control_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TV Control Bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config()?;
    tracing::info!("Configuration loaded ({} device entries)", config.devices.len());

    let bus = bus::create_bus();
    let store = DeviceStore::new(config::get_data_dir());
    let registry = Arc::new(DeviceRegistry::new(store, config.devices));
    let remote = Arc::new(NetworkRemote::new());
    let discovery: Arc<dyn Discovery> = Arc::new(SsdpDiscovery::new());

    // Initial pass: discovery failure is non-fatal, persisted devices
    // still carry forward through an empty result.
    let discovered = match discovery.discover().await {
        Ok(devices) => {
            tracing::info!("Discovery found {} device(s)", devices.len());
            devices
        }
        Err(e) => {
            tracing::warn!("Initial discovery failed: {:#}", e);
            Vec::new()
        }
    };
    let merged = registry.reconcile(discovered).await?;

    // Pair everything seen this pass; failures leave devices token-less
    // until a later pass.
    let pairing = PairingCoordinator::new(registry.clone(), remote.clone(), bus.clone());
    let paired = pairing.pair_discovered(&merged).await;
    tracing::info!("Pairing complete ({} newly paired)", paired);

    let points = build_control_points(registry.clone(), remote.clone(), bus.clone()).await;
    tracing::info!("Registered {} control point(s)", points.len());

    let shutdown = CancellationToken::new();
    let scheduler = RefreshScheduler::new(
        registry.clone(),
        discovery.clone(),
        bus.clone(),
        shutdown.clone(),
    )
    .with_intervals(
        Duration::from_secs(config.refresh_interval_secs),
        Duration::from_secs(config.poll_interval_secs),
    );
    scheduler.start(&points);

    shutdown_signal().await;

    bus.publish(tv_control_bridge::bus::BusEvent::ShuttingDown);
    shutdown.cancel();
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
