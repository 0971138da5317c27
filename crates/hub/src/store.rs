//! Central hub registry for AppWrappers and Spoke cluster state
//!
//! One coarse lock guards both maps; write rates are low and nothing awaits
//! while holding it.

use crate::models::{AppWrapper, ClusterInfo, ClusterStatus, Phase};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use verdant_common::{HubError, Result, unix_now};

#[derive(Default)]
struct Inner {
    appwrappers: HashMap<String, AppWrapper>,
    clusters: HashMap<String, ClusterInfo>,
}

/// Aggregate counts over the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub total_appwrappers: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub total_clusters: usize,
    pub ready_clusters: usize,
}

/// Concurrent-safe registry of AppWrappers and ClusterInfo
#[derive(Default)]
pub struct HubStore {
    inner: RwLock<Inner>,
}

impl HubStore {
    pub fn new() -> Self {
        info!("Hub store initialized");
        Self::default()
    }

    // ---- AppWrappers -----------------------------------------------------

    /// Register a new AppWrapper. Fails when the job id is already taken.
    pub fn add_appwrapper(&self, aw: AppWrapper) -> Result<String> {
        let job_id = aw.spec.job_id.clone();
        let mut inner = self.inner.write();
        if inner.appwrappers.contains_key(&job_id) {
            return Err(HubError::DuplicateJobId(job_id));
        }
        info!(
            job_id = %job_id,
            cpu = aw.spec.cpu,
            mem_gb = aw.spec.mem_gb,
            "Added AppWrapper"
        );
        inner.appwrappers.insert(job_id.clone(), aw);
        Ok(job_id)
    }

    pub fn get_appwrapper(&self, job_id: &str) -> Option<AppWrapper> {
        self.inner.read().appwrappers.get(job_id).cloned()
    }

    pub fn get_all_appwrappers(&self) -> Vec<AppWrapper> {
        self.inner.read().appwrappers.values().cloned().collect()
    }

    /// AppWrappers still waiting on a placement decision.
    pub fn pending_appwrappers(&self) -> Vec<AppWrapper> {
        self.inner
            .read()
            .appwrappers
            .values()
            .filter(|aw| aw.is_pending())
            .cloned()
            .collect()
    }

    /// Running workloads; candidates for future migration.
    pub fn running_appwrappers(&self) -> Vec<AppWrapper> {
        self.inner
            .read()
            .appwrappers
            .values()
            .filter(|aw| aw.status.phase == Phase::Running)
            .cloned()
            .collect()
    }

    /// Replace an AppWrapper atomically, enforcing lifecycle invariants.
    pub fn update_appwrapper(&self, job_id: &str, aw: AppWrapper) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(existing) = inner.appwrappers.get(job_id) else {
            return Err(HubError::NotFound(job_id.to_string()));
        };

        Self::check_invariants(existing, &aw)?;
        inner.appwrappers.insert(job_id.to_string(), aw);
        debug!(job_id = %job_id, "Updated AppWrapper");
        Ok(())
    }

    /// Remove an AppWrapper; returns whether it existed.
    pub fn remove_appwrapper(&self, job_id: &str) -> bool {
        let removed = self.inner.write().appwrappers.remove(job_id).is_some();
        if removed {
            info!(job_id = %job_id, "Removed AppWrapper");
        }
        removed
    }

    fn check_invariants(existing: &AppWrapper, new: &AppWrapper) -> Result<()> {
        let job_id = new.spec.job_id.clone();

        if new.status.dispatched {
            if new.spec.target_cluster.is_none() {
                return Err(HubError::InvalidTransition {
                    job_id,
                    reason: "dispatched without a target cluster".to_string(),
                });
            }
            if !new.all_gates_open() {
                return Err(HubError::InvalidTransition {
                    job_id,
                    reason: "gate closed while dispatched".to_string(),
                });
            }
        }

        if existing.status.dispatched && !new.status.dispatched {
            return Err(HubError::InvalidTransition {
                job_id,
                reason: "dispatched flag cannot be cleared".to_string(),
            });
        }

        if new.status.phase != Phase::Pending && !new.status.dispatched {
            return Err(HubError::InvalidTransition {
                job_id,
                reason: format!("phase {:?} requires dispatched=true", new.status.phase),
            });
        }

        Ok(())
    }

    // ---- Clusters --------------------------------------------------------

    /// Upsert cluster state reported by a Spoke.
    ///
    /// `last_updated` is stamped when the caller omitted it and never moves
    /// backwards for a given cluster.
    pub fn update_cluster_info(&self, mut info: ClusterInfo) {
        let mut inner = self.inner.write();

        let now = unix_now();
        let incoming = info.last_updated.unwrap_or(now);
        let floor = inner
            .clusters
            .get(&info.name)
            .and_then(|c| c.last_updated)
            .unwrap_or(0.0);
        info.last_updated = Some(incoming.max(floor));

        debug!(
            cluster = %info.name,
            ci = info.carbon_intensity,
            cpu_available = info.resources.cpu_available,
            "Updated cluster info"
        );
        inner.clusters.insert(info.name.clone(), info);
    }

    pub fn get_cluster_info(&self, name: &str) -> Option<ClusterInfo> {
        self.inner.read().clusters.get(name).cloned()
    }

    pub fn get_all_clusters(&self) -> Vec<ClusterInfo> {
        self.inner.read().clusters.values().cloned().collect()
    }

    pub fn ready_clusters(&self) -> Vec<ClusterInfo> {
        self.inner
            .read()
            .clusters
            .values()
            .filter(|c| c.status == ClusterStatus::Ready)
            .cloned()
            .collect()
    }

    // ---- Stats -----------------------------------------------------------

    pub fn stats(&self) -> HubStats {
        let inner = self.inner.read();
        let phase_count = |phase: Phase| {
            inner
                .appwrappers
                .values()
                .filter(|aw| aw.status.phase == phase)
                .count()
        };

        HubStats {
            total_appwrappers: inner.appwrappers.len(),
            pending: phase_count(Phase::Pending),
            running: phase_count(Phase::Running),
            completed: phase_count(Phase::Completed),
            total_clusters: inner.clusters.len(),
            ready_clusters: inner
                .clusters
                .values()
                .filter(|c| c.status == ClusterStatus::Ready)
                .count(),
        }
    }
}
