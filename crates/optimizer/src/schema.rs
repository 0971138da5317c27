//! Data schema for the placement optimization model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default watts drawn per CPU core, used for the carbon term.
pub const DEFAULT_WATT_CPU: f64 = 30.0;

/// Default penalty for deviating from the previous plan (a migration).
pub const DEFAULT_LAMBDA_PLAN_DEV: f64 = 100.0;

/// Job requirements for scheduling, in slot units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: String,
    /// Required CPU cores
    pub cpu: f64,
    /// Required memory (GB)
    pub mem_gb: f64,
    /// Required GPUs
    #[serde(default)]
    pub gpu: u32,
    /// Number of slots the job runs for
    pub runtime_slots: u32,
    /// Earliest slot the job may start in
    #[serde(default)]
    pub release_slot: u32,
    /// Slot by which the job must have finished
    pub deadline_slot: u32,
    /// Data payload moved when the job migrates (GB)
    #[serde(default)]
    pub data_gb: f64,
    /// Admissible regions; empty means any
    #[serde(default)]
    pub affinity_regions: Vec<String>,
}

impl JobSpec {
    /// Latest slot the job can start in and still meet its deadline within
    /// the horizon. `None` when no start slot is feasible.
    pub fn latest_start(&self, horizon_slots: u32) -> Option<u32> {
        let by_deadline = self.deadline_slot.checked_sub(self.runtime_slots)?;
        let latest = by_deadline.min(horizon_slots.checked_sub(1)?);
        (self.release_slot <= latest).then_some(latest)
    }

    /// Whether `region` is admissible under the affinity set.
    pub fn admits_region(&self, region: &str) -> bool {
        self.affinity_regions.is_empty() || self.affinity_regions.iter().any(|r| r == region)
    }
}

/// Cluster resource capacity at one time slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCapacity {
    pub region: String,
    pub slot: u32,
    pub cpu_cap: f64,
    pub mem_gb_cap: f64,
    #[serde(default)]
    pub gpu_cap: f64,
}

/// Carbon intensity in one region at one time slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonPoint {
    pub region: String,
    pub slot: u32,
    pub ci_gco2_per_kwh: f64,
}

/// A scheduled placement for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub job_id: String,
    pub region: String,
    pub start_slot: u32,
}

/// Input bundle for one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeInput {
    pub jobs: Vec<JobSpec>,
    pub capacities: Vec<ClusterCapacity>,
    pub carbons: Vec<CarbonPoint>,
    pub regions: Vec<String>,
    /// Slot length in seconds
    pub slot_seconds: f64,
    /// Planning window in slots
    pub horizon_slots: u32,
    /// Cost parameters; recognized keys: `watt_cpu`, `lambda_plan_dev`
    #[serde(default)]
    pub costs: BTreeMap<String, f64>,
    /// Network transfer cost per GB, `from_region -> to_region -> cost`
    #[serde(default)]
    pub network_costs: BTreeMap<String, BTreeMap<String, f64>>,
    /// Whether jobs may deviate from their previous region at a penalty
    pub migration_allow: bool,
    /// Previous placement, `job_id -> region`
    #[serde(default)]
    pub prev_plan: BTreeMap<String, String>,
}

impl OptimizeInput {
    pub fn watt_cpu(&self) -> f64 {
        self.costs.get("watt_cpu").copied().unwrap_or(DEFAULT_WATT_CPU)
    }

    pub fn lambda_plan_dev(&self) -> f64 {
        self.costs
            .get("lambda_plan_dev")
            .copied()
            .unwrap_or(DEFAULT_LAMBDA_PLAN_DEV)
    }

    /// Slot length in hours, floored away from zero to keep the energy term
    /// well-defined for degenerate inputs.
    pub fn slot_hours(&self) -> f64 {
        (self.slot_seconds / 3600.0).max(0.0001)
    }

    pub fn network_cost(&self, from: &str, to: &str) -> f64 {
        self.network_costs
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Outcome reported by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    /// Proven optimal within the time limit
    Optimal,
    /// Feasible but not proven optimal when the time limit hit
    Feasible,
    /// At least one job had no feasible placement; fallback applied
    Infeasible,
    /// The wall-clock limit expired before any solution was found
    TimeLimit,
    Unknown,
}

/// Output of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeOutput {
    pub plans: Vec<PlanItem>,
    /// Objective value in kg: carbon plus migration penalties. An
    /// optimization score, not a pure emissions figure.
    pub co2_estimate_kg: f64,
    /// Pure carbon term of the chosen plan, in kg.
    pub carbon_co2_estimate_kg: f64,
    pub solver_status: SolverStatus,
    /// Jobs whose chosen region differs from their previous placement
    pub migrations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(runtime: u32, release: u32, deadline: u32) -> JobSpec {
        JobSpec {
            job_id: "j".to_string(),
            cpu: 1.0,
            mem_gb: 1.0,
            gpu: 0,
            runtime_slots: runtime,
            release_slot: release,
            deadline_slot: deadline,
            data_gb: 0.0,
            affinity_regions: Vec::new(),
        }
    }

    #[test]
    fn test_latest_start_within_horizon() {
        assert_eq!(job(6, 0, 12).latest_start(12), Some(6));
        assert_eq!(job(6, 0, 12).latest_start(4), Some(3));
    }

    #[test]
    fn test_latest_start_infeasible() {
        // Deadline tighter than the runtime leaves no start slot.
        assert_eq!(job(6, 0, 4).latest_start(12), None);
        // Release after the last admissible start.
        assert_eq!(job(3, 5, 7).latest_start(12), None);
    }

    #[test]
    fn test_admits_region() {
        let mut j = job(1, 0, 2);
        assert!(j.admits_region("KR"));

        j.affinity_regions = vec!["JP".to_string()];
        assert!(j.admits_region("JP"));
        assert!(!j.admits_region("KR"));
    }

    #[test]
    fn test_cost_defaults() {
        let input = OptimizeInput {
            jobs: Vec::new(),
            capacities: Vec::new(),
            carbons: Vec::new(),
            regions: Vec::new(),
            slot_seconds: 300.0,
            horizon_slots: 12,
            costs: BTreeMap::new(),
            network_costs: BTreeMap::new(),
            migration_allow: true,
            prev_plan: BTreeMap::new(),
        };

        assert_eq!(input.watt_cpu(), DEFAULT_WATT_CPU);
        assert_eq!(input.lambda_plan_dev(), DEFAULT_LAMBDA_PLAN_DEV);
        assert!((input.slot_hours() - 300.0 / 3600.0).abs() < 1e-12);
        assert_eq!(input.network_cost("JP", "KR"), 0.0);
    }
}
