//! Verdant hub entry point
//!
//! Wires the dependency graph explicitly: carbon monitor, store, and solver
//! are leaves; scheduler and dispatcher receive them by reference; the API
//! server sits on top.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use verdant_carbon::{CarbonMonitor, ElectricityMapsProvider, MockProvider, ProviderBackend};
use verdant_hub::api::{self, ApiState};
use verdant_hub::scheduler::SchedulerConfig;
use verdant_hub::{
    HubConfig, HubDispatcher, HubScheduler, HubStore, KubeSpokes, Shutdown, metrics, sync,
};
use verdant_optimizer::MilpSolver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Verdant hub");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = HubConfig::from_env();
    let metrics_handle = metrics::init_metrics();

    let provider = if config.use_mock_data {
        info!("MOCK MODE ENABLED - serving synthesized carbon intensity data");
        ProviderBackend::Mock(MockProvider::new())
    } else {
        ProviderBackend::ElectricityMaps(ElectricityMapsProvider::new(config.api_key.clone()))
    };

    let monitor = Arc::new(CarbonMonitor::new(
        provider,
        Duration::from_secs(config.carbon_poll_interval_s),
    ));
    monitor.start(&config.zones).await;
    info!(zones = ?config.zones, "Carbon monitoring started");

    let store = Arc::new(HubStore::new());

    let scheduler = Arc::new(HubScheduler::new(
        Arc::clone(&store),
        MilpSolver::new(),
        SchedulerConfig {
            schedule_interval: Duration::from_secs(config.schedule_interval_s),
            ..SchedulerConfig::default()
        },
    ));

    let dispatcher = Arc::new(HubDispatcher::new(
        Arc::clone(&store),
        KubeSpokes::new(),
        Duration::from_secs(config.dispatch_interval_s),
    ));

    let shutdown = Shutdown::new();
    tokio::spawn(Arc::clone(&scheduler).run(shutdown.subscribe()));
    tokio::spawn(Arc::clone(&dispatcher).run(shutdown.subscribe()));
    tokio::spawn(sync::run_sync_loop(
        Arc::clone(&store),
        Arc::clone(&monitor),
        shutdown.subscribe(),
    ));

    let signal_waiter = shutdown.clone();
    tokio::spawn(async move {
        signal_waiter.wait_for_signal().await;
    });

    let state = ApiState {
        store,
        monitor: Arc::clone(&monitor),
        scheduler,
        dispatcher,
        metrics: metrics_handle,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Hub API listening on http://{}", config.bind_address);

    let mut serve_shutdown = shutdown.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.recv().await;
        })
        .await?;

    monitor.stop();
    info!("Hub shutdown complete");
    Ok(())
}
