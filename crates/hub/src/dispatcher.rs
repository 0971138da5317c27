//! Periodic dispatch driver
//!
//! Finds AppWrappers whose placement is decided and every gate open, creates
//! the corresponding Kubernetes Job on the target Spoke, and flips the
//! AppWrapper to Running. The `dispatched` guard plus the 409 rule make
//! dispatch effectively at-most-once even though Job creation is
//! at-least-once.

use crate::models::{AppWrapper, Phase};
use crate::spoke::{SpokeJobs, build_job_manifest};
use crate::store::HubStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use verdant_common::{HubError, Result, unix_now};

/// Periodic dispatch driver over a Spoke job API
pub struct HubDispatcher<S> {
    store: Arc<HubStore>,
    spokes: Arc<S>,
    dispatch_interval: Duration,
}

impl<S: SpokeJobs + 'static> HubDispatcher<S> {
    pub fn new(store: Arc<HubStore>, spokes: S, dispatch_interval: Duration) -> Self {
        info!(
            interval_secs = dispatch_interval.as_secs(),
            "Hub dispatcher initialized"
        );
        Self {
            store,
            spokes: Arc::new(spokes),
            dispatch_interval,
        }
    }

    /// Run cycles at the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!("Dispatcher loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.dispatch_interval) => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Dispatcher loop stopped");
                    return;
                }
            }
        }
    }

    /// One dispatch cycle. Returns the number of AppWrappers dispatched.
    pub async fn run_cycle(&self) -> usize {
        let dispatchable: Vec<AppWrapper> = self
            .store
            .get_all_appwrappers()
            .into_iter()
            .filter(AppWrapper::is_dispatchable)
            .collect();

        if dispatchable.is_empty() {
            debug!("No dispatchable AppWrappers");
            return 0;
        }

        info!(count = dispatchable.len(), "Found dispatchable AppWrappers");

        let mut dispatched = 0;
        for aw in dispatchable {
            let job_id = aw.spec.job_id.clone();
            match self.dispatch_appwrapper(aw).await {
                Ok(()) => dispatched += 1,
                Err(e) => error!(job_id = %job_id, error = %e, "Dispatch failed"),
            }
        }
        dispatched
    }

    async fn dispatch_appwrapper(&self, mut aw: AppWrapper) -> Result<()> {
        let job_id = aw.spec.job_id.clone();
        let target = aw
            .spec
            .target_cluster
            .clone()
            .ok_or_else(|| HubError::Internal(format!("{job_id} has no target cluster")))?;

        info!(job_id = %job_id, target = %target, "Dispatching AppWrapper");

        let Some(cluster) = self.store.get_cluster_info(&target) else {
            aw.status.message = Some(format!("dispatch failed: unknown cluster {target}"));
            self.store.update_appwrapper(&job_id, aw)?;
            return Err(HubError::UnknownCluster(target));
        };

        let manifest = build_job_manifest(&aw);
        match self
            .spokes
            .create_job(&cluster.kubeconfig_context, &manifest)
            .await
        {
            Ok(outcome) => {
                debug!(job_id = %job_id, ?outcome, "Job present on Spoke");
                aw.status.dispatched = true;
                aw.status.phase = Phase::Running;
                aw.status.cluster = Some(target.clone());
                aw.status.start_time = Some(unix_now());
                aw.status.message = Some(format!("dispatched to {target}"));
                self.store.update_appwrapper(&job_id, aw)?;
                info!(job_id = %job_id, target = %target, "AppWrapper dispatched");
                Ok(())
            }
            Err(e) => {
                warn!(job_id = %job_id, target = %target, error = %e, "Job creation failed");
                aw.status.message = Some(format!("dispatch failed: {e}"));
                self.store.update_appwrapper(&job_id, aw)?;
                Err(HubError::Dispatch(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppWrapperSpec, ClusterInfo, ClusterResources, ClusterStatus, GateStatus,
    };
    use crate::spoke::{CreateOutcome, SpokeError};
    use k8s_openapi::api::batch::v1::Job;
    use parking_lot::Mutex;

    /// Records every create call; outcome is scripted per test.
    struct StubSpokes {
        calls: Mutex<Vec<(String, String)>>,
        outcome: fn() -> std::result::Result<CreateOutcome, SpokeError>,
    }

    impl StubSpokes {
        fn succeeding() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: || Ok(CreateOutcome::Created),
            }
        }

        fn conflicting() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: || Ok(CreateOutcome::AlreadyExists),
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: || Err(SpokeError::Api("403 Forbidden".to_string())),
            }
        }
    }

    impl SpokeJobs for Arc<StubSpokes> {
        async fn create_job(
            &self,
            context: &str,
            job: &Job,
        ) -> std::result::Result<CreateOutcome, SpokeError> {
            self.calls.lock().push((
                context.to_string(),
                job.metadata.name.clone().unwrap_or_default(),
            ));
            (self.outcome)()
        }
    }

    fn store_with_cluster(name: &str) -> Arc<HubStore> {
        let store = Arc::new(HubStore::new());
        store.update_cluster_info(ClusterInfo {
            name: name.to_string(),
            geolocation: name.to_string(),
            carbon_intensity: 120.0,
            status: ClusterStatus::Ready,
            resources: ClusterResources {
                cpu_available: 16.0,
                cpu_total: 16.0,
                mem_available_gb: 64.0,
                mem_total_gb: 64.0,
                gpu_available: 0,
                gpu_total: 0,
            },
            kubeconfig_context: format!("kind-{name}"),
            last_updated: None,
        });
        store
    }

    fn decided(store: &HubStore, id: &str, target: &str) {
        let mut aw = AppWrapper::submitted(AppWrapperSpec {
            job_id: id.to_string(),
            cpu: 2.0,
            mem_gb: 4.0,
            gpu: 0,
            runtime_minutes: 15,
            deadline_minutes: 45,
            data_gb: 0.0,
            affinity_clusters: Vec::new(),
            image: "busybox:latest".to_string(),
            command: vec!["sleep".to_string(), "60".to_string()],
            target_cluster: None,
            dispatching_gates: Vec::new(),
        });
        aw.spec.target_cluster = Some(target.to_string());
        aw.open_gates("scheduled");
        store.add_appwrapper(aw).unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_flips_state_and_creates_job() {
        let store = store_with_cluster("KR");
        decided(&store, "job-1", "KR");
        let spokes = Arc::new(StubSpokes::succeeding());
        let dispatcher =
            HubDispatcher::new(Arc::clone(&store), Arc::clone(&spokes), Duration::from_secs(30));

        assert_eq!(dispatcher.run_cycle().await, 1);

        let aw = store.get_appwrapper("job-1").unwrap();
        assert!(aw.status.dispatched);
        assert_eq!(aw.status.phase, Phase::Running);
        assert_eq!(aw.status.cluster.as_deref(), Some("KR"));
        assert!(aw.status.start_time.is_some());

        let calls = spokes.calls.lock();
        assert_eq!(calls.as_slice(), &[("kind-KR".to_string(), "job-1".to_string())]);
    }

    #[tokio::test]
    async fn test_second_cycle_is_idempotent() {
        let store = store_with_cluster("KR");
        decided(&store, "job-1", "KR");
        let spokes = Arc::new(StubSpokes::succeeding());
        let dispatcher =
            HubDispatcher::new(Arc::clone(&store), Arc::clone(&spokes), Duration::from_secs(30));

        assert_eq!(dispatcher.run_cycle().await, 1);
        assert_eq!(dispatcher.run_cycle().await, 0);
        assert_eq!(spokes.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_preexisting_job_counts_as_dispatched() {
        let store = store_with_cluster("KR");
        decided(&store, "job-1", "KR");
        let spokes = Arc::new(StubSpokes::conflicting());
        let dispatcher =
            HubDispatcher::new(Arc::clone(&store), Arc::clone(&spokes), Duration::from_secs(30));

        // The Spoke already has this Job (e.g. a partial dispatch before a
        // restart); the 409 reconciles it.
        assert_eq!(dispatcher.run_cycle().await, 1);
        assert!(store.get_appwrapper("job-1").unwrap().status.dispatched);

        assert_eq!(dispatcher.run_cycle().await, 0);
        assert_eq!(spokes.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_cluster_leaves_appwrapper_pending() {
        let store = store_with_cluster("KR");
        decided(&store, "job-1", "DE");
        let spokes = Arc::new(StubSpokes::succeeding());
        let dispatcher =
            HubDispatcher::new(Arc::clone(&store), Arc::clone(&spokes), Duration::from_secs(30));

        assert_eq!(dispatcher.run_cycle().await, 0);

        let aw = store.get_appwrapper("job-1").unwrap();
        assert!(!aw.status.dispatched);
        assert!(aw.status.message.as_deref().unwrap().contains("unknown cluster"));
        assert!(spokes.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_records_message_and_retries_next_cycle() {
        let store = store_with_cluster("KR");
        decided(&store, "job-1", "KR");
        let spokes = Arc::new(StubSpokes::failing());
        let dispatcher =
            HubDispatcher::new(Arc::clone(&store), Arc::clone(&spokes), Duration::from_secs(30));

        assert_eq!(dispatcher.run_cycle().await, 0);

        let aw = store.get_appwrapper("job-1").unwrap();
        assert!(!aw.status.dispatched);
        assert_eq!(aw.status.phase, Phase::Pending);
        assert!(aw.status.message.as_deref().unwrap().contains("403"));

        // Still dispatchable, so the next cycle tries again.
        assert_eq!(dispatcher.run_cycle().await, 0);
        assert_eq!(spokes.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_gate_blocks_dispatch() {
        let store = store_with_cluster("KR");
        decided(&store, "job-1", "KR");

        let mut aw = store.get_appwrapper("job-1").unwrap();
        aw.spec.dispatching_gates[0].status = GateStatus::Closed;
        store.update_appwrapper("job-1", aw).unwrap();

        let spokes = Arc::new(StubSpokes::succeeding());
        let dispatcher =
            HubDispatcher::new(Arc::clone(&store), Arc::clone(&spokes), Duration::from_secs(30));

        assert_eq!(dispatcher.run_cycle().await, 0);
        assert!(spokes.calls.lock().is_empty());
    }
}
