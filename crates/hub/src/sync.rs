//! Carbon-to-cluster sync loop
//!
//! Every 15 seconds the freshest monitor snapshot is copied into each
//! registered ClusterInfo whose name matches a zone, and the aggregate
//! gauges are refreshed from the store.

use crate::metrics;
use crate::store::HubStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use verdant_carbon::{CarbonMonitor, CarbonProvider};
use verdant_common::unix_now;

/// Cadence of the carbon-to-store copy.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(15);

/// Run the sync loop until shutdown.
pub async fn run_sync_loop<P: CarbonProvider + 'static>(
    store: Arc<HubStore>,
    monitor: Arc<CarbonMonitor<P>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("Cluster-info sync loop started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SYNC_INTERVAL) => {
                sync_once(&store, &monitor);
            }
            _ = shutdown.recv() => {
                info!("Cluster-info sync loop stopped");
                return;
            }
        }
    }
}

/// One sync pass: copy carbon readings into cluster records and refresh the
/// exported gauges.
pub fn sync_once<P: CarbonProvider + 'static>(store: &HubStore, monitor: &CarbonMonitor<P>) {
    let snapshots = monitor.latest();

    for (zone, snapshot) in &snapshots {
        metrics::update_zone_intensity(zone, snapshot.carbon_intensity, snapshot.fetched_at);

        if let Some(mut cluster) = store.get_cluster_info(zone) {
            cluster.carbon_intensity = snapshot.carbon_intensity;
            cluster.last_updated = Some(unix_now());
            store.update_cluster_info(cluster);
            debug!(zone = %zone, ci = snapshot.carbon_intensity, "Synced carbon into cluster info");
        }
    }

    if let Some(best) = monitor.best() {
        metrics::set_best_zone(snapshots.keys().map(String::as_str), &best.zone);
    }

    metrics::update_store_gauges(&store.stats());

    // A migration is "in progress" from the decision until the workload is
    // dispatched onto its new cluster.
    let in_progress = store
        .get_all_appwrappers()
        .iter()
        .filter(|aw| aw.metadata.contains_key("migrated_from") && !aw.status.dispatched)
        .count();
    metrics::set_migrations_in_progress(in_progress);
}
