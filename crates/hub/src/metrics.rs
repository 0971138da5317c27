//! Prometheus metrics for the hub
//!
//! Metric names are a wire contract consumed by dashboards; keep them stable.

use crate::store::HubStats;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

/// Global metrics handle
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names
pub mod names {
    pub const GRID_CARBON_INTENSITY: &str = "grid_carbon_intensity_gco2_per_kwh";
    pub const CARBON_LAST_UPDATED: &str = "carbon_last_updated_unix";
    pub const BEST_ZONE_INDICATOR: &str = "best_zone_indicator";
    pub const APPWRAPPERS_TOTAL: &str = "appwrappers_total";
    pub const APPWRAPPERS_PENDING: &str = "appwrappers_pending";
    pub const APPWRAPPERS_RUNNING: &str = "appwrappers_running";
    pub const APPWRAPPERS_COMPLETED: &str = "appwrappers_completed";
    pub const CLUSTERS_TOTAL: &str = "clusters_total";
    pub const CLUSTERS_READY: &str = "clusters_ready";
    pub const MIGRATIONS_TOTAL: &str = "migrations_total";
    pub const MIGRATION_DATA_GB: &str = "migration_data_transferred_gb";
    pub const MIGRATIONS_IN_PROGRESS: &str = "migrations_in_progress";
    pub const MIGRATION_COST_GCO2: &str = "migration_cost_gco2";
}

/// Install the Prometheus recorder and describe every exported metric.
#[allow(clippy::expect_used)] // Panicking is acceptable during initialization
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    describe_gauge!(
        names::GRID_CARBON_INTENSITY,
        "Current grid carbon intensity in gCO2/kWh"
    );
    describe_gauge!(
        names::CARBON_LAST_UPDATED,
        "Unix timestamp of last carbon intensity update"
    );
    describe_gauge!(
        names::BEST_ZONE_INDICATOR,
        "Indicator for the best zone (1=best, 0=not best)"
    );
    describe_gauge!(names::APPWRAPPERS_TOTAL, "Total number of AppWrappers");
    describe_gauge!(names::APPWRAPPERS_PENDING, "Number of pending AppWrappers");
    describe_gauge!(names::APPWRAPPERS_RUNNING, "Number of running AppWrappers");
    describe_gauge!(
        names::APPWRAPPERS_COMPLETED,
        "Number of completed AppWrappers"
    );
    describe_gauge!(names::CLUSTERS_TOTAL, "Total number of clusters");
    describe_gauge!(names::CLUSTERS_READY, "Number of ready clusters");
    describe_counter!(
        names::MIGRATIONS_TOTAL,
        "Total number of workload migrations"
    );
    describe_gauge!(
        names::MIGRATION_DATA_GB,
        "Total data transferred during migrations in GB"
    );
    describe_gauge!(
        names::MIGRATIONS_IN_PROGRESS,
        "Number of migrations currently in progress"
    );
    describe_gauge!(
        names::MIGRATION_COST_GCO2,
        "Total carbon cost of migrations in gCO2"
    );

    info!("Metrics system initialized");

    METRICS_HANDLE.set(handle.clone()).ok();
    handle
}

/// Get the global metrics handle
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Update the carbon intensity gauge for a zone
pub fn update_zone_intensity(zone: &str, intensity: f64, fetched_at: f64) {
    gauge!(names::GRID_CARBON_INTENSITY, "zone" => zone.to_string()).set(intensity);
    gauge!(names::CARBON_LAST_UPDATED).set(fetched_at);
}

/// Mark exactly one zone as the current best
pub fn set_best_zone<'a>(zones: impl Iterator<Item = &'a str>, best: &str) {
    for zone in zones {
        let indicator = if zone == best { 1.0 } else { 0.0 };
        gauge!(names::BEST_ZONE_INDICATOR, "zone" => zone.to_string()).set(indicator);
    }
}

/// Refresh the aggregate registry gauges
pub fn update_store_gauges(stats: &HubStats) {
    gauge!(names::APPWRAPPERS_TOTAL).set(stats.total_appwrappers as f64);
    gauge!(names::APPWRAPPERS_PENDING).set(stats.pending as f64);
    gauge!(names::APPWRAPPERS_RUNNING).set(stats.running as f64);
    gauge!(names::APPWRAPPERS_COMPLETED).set(stats.completed as f64);
    gauge!(names::CLUSTERS_TOTAL).set(stats.total_clusters as f64);
    gauge!(names::CLUSTERS_READY).set(stats.ready_clusters as f64);
}

/// Record one migration decision
pub fn record_migration(from: &str, to: &str, data_gb: f64, cost_gco2: f64) {
    counter!(
        names::MIGRATIONS_TOTAL,
        "from_cluster" => from.to_string(),
        "to_cluster" => to.to_string()
    )
    .increment(1);
    // Counters in the metrics facade are integer-valued; the transferred
    // total is fractional GB, so it accumulates on a gauge instead.
    gauge!(
        names::MIGRATION_DATA_GB,
        "from_cluster" => from.to_string(),
        "to_cluster" => to.to_string()
    )
    .increment(data_gb);
    gauge!(
        names::MIGRATION_COST_GCO2,
        "from_cluster" => from.to_string(),
        "to_cluster" => to.to_string()
    )
    .increment(cost_gco2);
}

/// Migrations decided but not yet dispatched to their new cluster
pub fn set_migrations_in_progress(count: usize) {
    gauge!(names::MIGRATIONS_IN_PROGRESS).set(count as f64);
}
