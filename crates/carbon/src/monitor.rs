//! Multi-zone carbon-intensity monitor
//!
//! One background poller per zone keeps a stale-tolerant cache of the
//! freshest snapshot. Fetch failures never evict: the previous snapshot
//! stays available until a fresh success overwrites it.

use crate::client::CarbonProvider;
use crate::types::{BestZone, CarbonSnapshot};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-zone carbon-intensity poller with a shared snapshot cache.
pub struct CarbonMonitor<P> {
    provider: Arc<P>,
    poll_interval: Duration,
    cache: Arc<RwLock<HashMap<String, CarbonSnapshot>>>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: CarbonProvider + 'static> CarbonMonitor<P> {
    pub fn new(provider: P, poll_interval: Duration) -> Self {
        Self {
            provider: Arc::new(provider),
            poll_interval,
            cache: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Fetch every zone once in parallel, then spawn one poller per zone.
    pub async fn start(&self, zones: &[String]) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Carbon monitor already running");
            return;
        }

        info!(zones = ?zones, "Starting multi-zone carbon monitoring");

        let initial = futures::future::join_all(
            zones.iter().map(|zone| self.provider.fetch_latest(zone)),
        )
        .await;

        {
            let mut cache = self.cache.write();
            for (zone, result) in zones.iter().zip(initial) {
                match result {
                    Ok(snapshot) => {
                        debug!(zone = %zone, ci = snapshot.carbon_intensity, "Initial carbon fetch");
                        cache.insert(zone.clone(), snapshot);
                    }
                    Err(e) => warn!(zone = %zone, error = %e, "Initial carbon fetch failed"),
                }
            }
        }

        let mut tasks = self.tasks.lock();
        for zone in zones {
            tasks.push(tokio::spawn(Self::poll_loop(
                zone.clone(),
                Arc::clone(&self.provider),
                Arc::clone(&self.cache),
                Arc::clone(&self.running),
                self.poll_interval,
            )));
        }
    }

    async fn poll_loop(
        zone: String,
        provider: Arc<P>,
        cache: Arc<RwLock<HashMap<String, CarbonSnapshot>>>,
        running: Arc<AtomicBool>,
        interval: Duration,
    ) {
        debug!(zone = %zone, interval_secs = interval.as_secs(), "Carbon poller started");

        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(interval).await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            match provider.fetch_latest(&zone).await {
                Ok(snapshot) => {
                    debug!(zone = %zone, ci = snapshot.carbon_intensity, "Updated carbon intensity");
                    cache.write().insert(zone.clone(), snapshot);
                }
                // Keep whatever snapshot we already had; staleness shows up
                // only as an unchanged fetched_at.
                Err(e) => warn!(zone = %zone, error = %e, "Carbon poll failed, keeping cached value"),
            }
        }

        debug!(zone = %zone, "Carbon poller stopped");
    }

    /// Stop all pollers. Cached snapshots remain readable.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("Carbon monitoring stopped");
    }

    /// Snapshot of every zone currently cached.
    pub fn latest(&self) -> HashMap<String, CarbonSnapshot> {
        self.cache.read().clone()
    }

    /// Cached snapshot for one zone, if any.
    pub fn zone(&self, name: &str) -> Option<CarbonSnapshot> {
        self.cache.read().get(name).cloned()
    }

    /// The zone with the lowest cached carbon intensity.
    ///
    /// Ties break by zone name ascending; returns `None` while the cache is
    /// empty.
    pub fn best(&self) -> Option<BestZone> {
        let cache = self.cache.read();

        let best = cache.values().min_by(|a, b| {
            a.carbon_intensity
                .partial_cmp(&b.carbon_intensity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.zone.cmp(&b.zone))
        })?;

        let all_zones = cache
            .values()
            .map(|s| (s.zone.clone(), s.carbon_intensity))
            .collect();

        Some(BestZone {
            zone: best.zone.clone(),
            carbon_intensity: best.carbon_intensity,
            datetime: best.datetime.clone(),
            fetched_at: best.fetched_at,
            all_zones,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl<P> Drop for CarbonMonitor<P> {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
