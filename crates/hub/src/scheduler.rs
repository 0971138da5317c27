//! Periodic scheduling driver
//!
//! One cycle collects pending AppWrappers and ready clusters, translates them
//! into an optimization instance, solves for minimum carbon plus migration
//! cost, and writes the decisions back: target cluster set, gates opened,
//! migrations accounted.

use crate::metrics;
use crate::models::{AppWrapper, ClusterInfo, SchedulingDecision};
use crate::store::HubStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use verdant_common::unix_now;
use verdant_optimizer::{
    CarbonPoint, ClusterCapacity, JobSpec, OptimizeInput, OptimizeOutput, PlacementSolver,
    SolverStatus, fallback_output,
};

/// Minutes per planning slot; AppWrapper runtimes are given in minutes.
const SLOT_MINUTES: u32 = 5;

const DECISION_REASON: &str = "optimal placement for minimum carbon footprint";

/// Scheduler timing and model parameters
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between scheduling cycles
    pub schedule_interval: Duration,
    /// Slot length fed to the optimizer (seconds)
    pub slot_seconds: f64,
    /// Planning window in slots
    pub horizon_slots: u32,
    /// Wall-clock budget for one solve
    pub solver_time_limit: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule_interval: Duration::from_secs(300),
            slot_seconds: 300.0,
            horizon_slots: 12,
            solver_time_limit: Duration::from_secs(10),
        }
    }
}

/// Periodic placement driver
pub struct HubScheduler<S> {
    store: Arc<HubStore>,
    solver: Arc<S>,
    config: SchedulerConfig,
}

impl<S: PlacementSolver + 'static> HubScheduler<S> {
    pub fn new(store: Arc<HubStore>, solver: S, config: SchedulerConfig) -> Self {
        info!(
            interval_secs = config.schedule_interval.as_secs(),
            horizon_slots = config.horizon_slots,
            "Hub scheduler initialized"
        );
        Self {
            store,
            solver: Arc::new(solver),
            config,
        }
    }

    /// Run cycles at the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!("Scheduler loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.schedule_interval) => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Scheduler loop stopped");
                    return;
                }
            }
        }
    }

    /// One scheduling cycle. Returns the number of decisions applied.
    pub async fn run_cycle(&self) -> usize {
        let pending = self.store.pending_appwrappers();
        if pending.is_empty() {
            debug!("No pending AppWrappers, skipping cycle");
            return 0;
        }

        let clusters = self.store.ready_clusters();
        if clusters.is_empty() {
            warn!("No ready clusters available, skipping cycle");
            return 0;
        }

        info!(
            pending = pending.len(),
            clusters = clusters.len(),
            "Starting scheduling cycle"
        );

        let input = self.build_input(&pending, &clusters);
        let output = self.solve(input).await;

        info!(
            status = ?output.solver_status,
            co2_kg = output.co2_estimate_kg,
            migrations = output.migrations,
            "Optimizer finished"
        );

        let decisions = self.decisions_from(&output, &pending, &clusters);
        self.apply(&decisions)
    }

    fn build_input(&self, pending: &[AppWrapper], clusters: &[ClusterInfo]) -> OptimizeInput {
        let jobs = pending
            .iter()
            .map(|aw| {
                let spec = &aw.spec;
                let runtime_slots = (spec.runtime_minutes / SLOT_MINUTES).max(1);
                let deadline_slot = (spec.deadline_minutes / SLOT_MINUTES).max(runtime_slots);
                JobSpec {
                    job_id: spec.job_id.clone(),
                    cpu: spec.cpu,
                    mem_gb: spec.mem_gb,
                    gpu: spec.gpu,
                    runtime_slots,
                    release_slot: 0,
                    deadline_slot,
                    data_gb: spec.data_gb,
                    affinity_regions: spec.affinity_clusters.clone(),
                }
            })
            .collect();

        // No intra-horizon forecast: each cluster's current headroom and
        // carbon intensity are broadcast across every slot.
        let mut capacities = Vec::new();
        let mut carbons = Vec::new();
        for ci in clusters {
            for slot in 0..self.config.horizon_slots {
                capacities.push(ClusterCapacity {
                    region: ci.name.clone(),
                    slot,
                    cpu_cap: ci.resources.cpu_available,
                    mem_gb_cap: ci.resources.mem_available_gb,
                    gpu_cap: f64::from(ci.resources.gpu_available),
                });
                carbons.push(CarbonPoint {
                    region: ci.name.clone(),
                    slot,
                    ci_gco2_per_kwh: ci.carbon_intensity,
                });
            }
        }

        let prev_plan = pending
            .iter()
            .filter_map(|aw| {
                aw.spec
                    .target_cluster
                    .clone()
                    .map(|region| (aw.spec.job_id.clone(), region))
            })
            .collect();

        OptimizeInput {
            jobs,
            capacities,
            carbons,
            regions: clusters.iter().map(|c| c.name.clone()).collect(),
            slot_seconds: self.config.slot_seconds,
            horizon_slots: self.config.horizon_slots,
            costs: BTreeMap::from([
                ("watt_cpu".to_string(), 30.0),
                ("lambda_plan_dev".to_string(), 100.0),
            ]),
            network_costs: BTreeMap::new(),
            migration_allow: true,
            prev_plan,
        }
    }

    /// Solve on a blocking thread under the wall-clock budget.
    async fn solve(&self, input: OptimizeInput) -> OptimizeOutput {
        let solver = Arc::clone(&self.solver);
        let solve_input = input.clone();
        let solve =
            tokio::task::spawn_blocking(move || solver.solve(&solve_input));

        match tokio::time::timeout(self.config.solver_time_limit, solve).await {
            Ok(Ok(output)) => output,
            Ok(Err(join_err)) => {
                error!(error = %join_err, "Solver task failed, applying fallback placements");
                fallback_output(&input, SolverStatus::Unknown)
            }
            Err(_) => {
                warn!(
                    limit_secs = self.config.solver_time_limit.as_secs(),
                    "Solver hit the wall-clock limit, applying fallback placements"
                );
                fallback_output(&input, SolverStatus::TimeLimit)
            }
        }
    }

    fn decisions_from(
        &self,
        output: &OptimizeOutput,
        pending: &[AppWrapper],
        clusters: &[ClusterInfo],
    ) -> Vec<SchedulingDecision> {
        output
            .plans
            .iter()
            .filter_map(|plan| {
                let aw = pending.iter().find(|aw| aw.spec.job_id == plan.job_id)?;
                let cluster = clusters.iter().find(|c| c.name == plan.region)?;

                let runtime_slots = (aw.spec.runtime_minutes / SLOT_MINUTES).max(1);
                let runtime_hours =
                    f64::from(runtime_slots) * self.config.slot_seconds / 3600.0;
                let estimated_co2_g =
                    cluster.carbon_intensity * aw.spec.cpu * 30.0 * runtime_hours / 1000.0;

                Some(SchedulingDecision {
                    job_id: plan.job_id.clone(),
                    target_cluster: plan.region.clone(),
                    start_time_minutes: plan.start_slot * SLOT_MINUTES,
                    estimated_co2_g,
                    reason: DECISION_REASON.to_string(),
                })
            })
            .collect()
    }

    /// Write decisions back into the store, accounting migrations.
    fn apply(&self, decisions: &[SchedulingDecision]) -> usize {
        let mut applied = 0;

        for decision in decisions {
            let Some(mut aw) = self.store.get_appwrapper(&decision.job_id) else {
                warn!(job_id = %decision.job_id, "AppWrapper vanished before decision applied");
                continue;
            };

            let previous = aw.spec.target_cluster.clone();
            let migration = previous
                .as_deref()
                .is_some_and(|prev| prev != decision.target_cluster);

            if migration {
                let from = previous.clone().unwrap_or_default();
                metrics::record_migration(
                    &from,
                    &decision.target_cluster,
                    aw.spec.data_gb,
                    100.0,
                );
                aw.metadata
                    .insert("migrated_from".to_string(), from.clone());
                aw.metadata
                    .insert("migration_time".to_string(), unix_now().to_string());
                info!(
                    job_id = %decision.job_id,
                    from = %from,
                    to = %decision.target_cluster,
                    data_gb = aw.spec.data_gb,
                    "Migration decided"
                );
            }

            aw.spec.target_cluster = Some(decision.target_cluster.clone());
            aw.open_gates(&decision.reason);
            aw.metadata
                .insert("scheduled_at".to_string(), unix_now().to_string());
            aw.metadata.insert(
                "estimated_co2_g".to_string(),
                decision.estimated_co2_g.to_string(),
            );

            match self.store.update_appwrapper(&decision.job_id, aw) {
                Ok(()) => {
                    applied += 1;
                    info!(
                        job_id = %decision.job_id,
                        target = %decision.target_cluster,
                        co2_g = decision.estimated_co2_g,
                        "Applied scheduling decision"
                    );
                }
                Err(e) => warn!(job_id = %decision.job_id, error = %e, "Failed to store decision"),
            }
        }

        applied
    }
}
