//! Time-indexed MILP placement model
//!
//! Decision variables are binary `x[job, region, start_slot]`, defined only
//! for tuples that satisfy affinity and deadline windows. The objective sums
//! a carbon term over every occupied slot and a migration penalty when a job
//! leaves its previous region.

use crate::schema::{OptimizeInput, OptimizeOutput, PlanItem, SolverStatus};
use good_lp::solvers::microlp::microlp;
use good_lp::{Expression, ResolutionError, Solution, SolverModel, Variable, constraint, variable, variables};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The seam between the scheduler and the optimization backend.
///
/// `solve` is pure and synchronous; callers that need a wall-clock limit run
/// it on a blocking thread and time out around it.
pub trait PlacementSolver: Send + Sync {
    fn solve(&self, input: &OptimizeInput) -> OptimizeOutput;
}

impl<T: PlacementSolver + ?Sized> PlacementSolver for Arc<T> {
    fn solve(&self, input: &OptimizeInput) -> OptimizeOutput {
        (**self).solve(input)
    }
}

/// Penalty that effectively forbids migrating when `migration_allow` is off.
const MIGRATION_PROHIBITED: f64 = 1e6;

/// Threshold for reading a binary variable from a relaxed solution.
const SELECTED: f64 = 0.5;

/// Default MILP implementation of [`PlacementSolver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MilpSolver;

impl MilpSolver {
    pub fn new() -> Self {
        Self
    }
}

struct Candidate {
    region: String,
    start_slot: u32,
    var: Variable,
    /// Full objective coefficient: carbon plus migration penalty
    cost: f64,
    /// Carbon-only part of the coefficient, in grams
    carbon_cost: f64,
}

impl PlacementSolver for MilpSolver {
    fn solve(&self, input: &OptimizeInput) -> OptimizeOutput {
        if input.jobs.is_empty() {
            return OptimizeOutput {
                plans: Vec::new(),
                co2_estimate_kg: 0.0,
                carbon_co2_estimate_kg: 0.0,
                solver_status: SolverStatus::Optimal,
                migrations: 0,
            };
        }

        let horizon = input.horizon_slots;
        let watt_cpu = input.watt_cpu();
        let lambda_dev = input.lambda_plan_dev();
        let slot_hours = input.slot_hours();

        let mut cap: HashMap<(&str, u32), (f64, f64, f64)> = HashMap::new();
        for c in &input.capacities {
            cap.insert((c.region.as_str(), c.slot), (c.cpu_cap, c.mem_gb_cap, c.gpu_cap));
        }
        let mut ci: HashMap<(&str, u32), f64> = HashMap::new();
        for p in &input.carbons {
            ci.insert((p.region.as_str(), p.slot), p.ci_gco2_per_kwh);
        }

        // Build x[j, r, t] over the feasible tuples only.
        let mut vars = variables!();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut per_job: Vec<Vec<usize>> = vec![Vec::new(); input.jobs.len()];

        for (job_idx, job) in input.jobs.iter().enumerate() {
            let Some(latest) = job.latest_start(horizon) else {
                continue;
            };
            let prev_region = input.prev_plan.get(&job.job_id);

            for region in &input.regions {
                if !job.admits_region(region) {
                    continue;
                }

                // Migration cost is per (job, region), independent of t.
                let mut migration_cost = 0.0;
                if let Some(prev) = prev_region
                    && prev != region
                {
                    migration_cost = if input.migration_allow {
                        lambda_dev + input.network_cost(prev, region) * job.data_gb
                    } else {
                        MIGRATION_PROHIBITED
                    };
                }

                for t in job.release_slot..=latest {
                    let carbon_cost: f64 = (t..(t + job.runtime_slots).min(horizon))
                        .map(|tau| {
                            ci.get(&(region.as_str(), tau)).copied().unwrap_or(0.0)
                                * job.cpu
                                * watt_cpu
                                * slot_hours
                                / 1000.0
                        })
                        .sum();

                    per_job[job_idx].push(candidates.len());
                    candidates.push(Candidate {
                        region: region.clone(),
                        start_slot: t,
                        var: vars.add(variable().binary()),
                        cost: carbon_cost + migration_cost,
                        carbon_cost,
                    });
                }
            }
        }

        if candidates.is_empty() {
            warn!("No feasible placement tuple for any job, applying fallback");
            return fallback_output(input, SolverStatus::Infeasible);
        }

        let objective: Expression = candidates
            .iter()
            .map(|c| c.var * c.cost)
            .sum();

        let mut model = vars.minimise(objective).using(microlp);

        // Each job with at least one feasible tuple starts exactly once.
        for starts in per_job.iter().filter(|s| !s.is_empty()) {
            let total: Expression = starts.iter().map(|&i| Expression::from(candidates[i].var)).sum();
            model = model.with(constraint::eq(total, 1.0));
        }

        // Resource capacity per (region, slot), over every overlapping job.
        let any_gpu_demand = input.jobs.iter().any(|j| j.gpu > 0);
        for region in &input.regions {
            for tau in 0..horizon {
                let Some(&(cpu_cap, mem_cap, gpu_cap)) = cap.get(&(region.as_str(), tau)) else {
                    continue;
                };

                let overlapping: Vec<(usize, usize)> = per_job
                    .iter()
                    .enumerate()
                    .flat_map(|(job_idx, starts)| {
                        starts.iter().map(move |&i| (job_idx, i))
                    })
                    .filter(|&(job_idx, i)| {
                        let c = &candidates[i];
                        c.region == *region
                            && c.start_slot <= tau
                            && tau < c.start_slot + input.jobs[job_idx].runtime_slots
                    })
                    .collect();

                if overlapping.is_empty() {
                    continue;
                }

                if cpu_cap > 0.0 {
                    let usage: Expression = overlapping
                        .iter()
                        .map(|&(job_idx, i)| candidates[i].var * input.jobs[job_idx].cpu)
                        .sum();
                    model = model.with(constraint::leq(usage, cpu_cap));
                }

                if mem_cap > 0.0 {
                    let usage: Expression = overlapping
                        .iter()
                        .map(|&(job_idx, i)| candidates[i].var * input.jobs[job_idx].mem_gb)
                        .sum();
                    model = model.with(constraint::leq(usage, mem_cap));
                }

                if gpu_cap > 0.0 && any_gpu_demand {
                    let usage: Expression = overlapping
                        .iter()
                        .map(|&(job_idx, i)| candidates[i].var * f64::from(input.jobs[job_idx].gpu))
                        .sum();
                    model = model.with(constraint::leq(usage, gpu_cap));
                }
            }
        }

        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(ResolutionError::Infeasible) => {
                warn!("Placement model infeasible, applying fallback for all jobs");
                return fallback_output(input, SolverStatus::Infeasible);
            }
            Err(e) => {
                warn!(error = %e, "Placement solve failed");
                return fallback_output(input, SolverStatus::Unknown);
            }
        };

        let mut plans = Vec::with_capacity(input.jobs.len());
        let mut migrations = 0u32;
        let mut any_fallback = false;
        let mut total_cost = 0.0;
        let mut total_carbon = 0.0;

        for (job_idx, job) in input.jobs.iter().enumerate() {
            let chosen = per_job[job_idx]
                .iter()
                .map(|&i| &candidates[i])
                .find(|c| solution.value(c.var) > SELECTED);

            let (region, start_slot) = match chosen {
                Some(c) => {
                    total_cost += c.cost;
                    total_carbon += c.carbon_cost;
                    (c.region.clone(), c.start_slot)
                }
                None => {
                    warn!(job_id = %job.job_id, "No placement found, falling back to first region");
                    any_fallback = true;
                    (fallback_region(input), job.release_slot)
                }
            };

            if let Some(prev) = input.prev_plan.get(&job.job_id)
                && *prev != region
            {
                migrations += 1;
            }

            plans.push(PlanItem {
                job_id: job.job_id.clone(),
                region,
                start_slot,
            });
        }

        debug!(
            jobs = plans.len(),
            migrations,
            co2_g = total_cost,
            "Placement solve complete"
        );

        OptimizeOutput {
            plans,
            co2_estimate_kg: total_cost / 1000.0,
            carbon_co2_estimate_kg: total_carbon / 1000.0,
            solver_status: if any_fallback {
                SolverStatus::Infeasible
            } else {
                SolverStatus::Optimal
            },
            migrations,
        }
    }
}

fn fallback_region(input: &OptimizeInput) -> String {
    input
        .regions
        .first()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string())
}

/// Assign every job its fallback placement: first region, release slot.
///
/// Used when the model is infeasible and by callers that hit the wall-clock
/// limit before a solution arrived.
pub fn fallback_output(input: &OptimizeInput, status: SolverStatus) -> OptimizeOutput {
    let region = fallback_region(input);
    let mut migrations = 0u32;

    let plans = input
        .jobs
        .iter()
        .map(|job| {
            if let Some(prev) = input.prev_plan.get(&job.job_id)
                && *prev != region
            {
                migrations += 1;
            }
            PlanItem {
                job_id: job.job_id.clone(),
                region: region.clone(),
                start_slot: job.release_slot,
            }
        })
        .collect();

    OptimizeOutput {
        plans,
        co2_estimate_kg: 0.0,
        carbon_co2_estimate_kg: 0.0,
        solver_status: status,
        migrations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CarbonPoint, ClusterCapacity, JobSpec};
    use std::collections::BTreeMap;

    fn job(id: &str, cpu: f64, runtime: u32, deadline: u32) -> JobSpec {
        JobSpec {
            job_id: id.to_string(),
            cpu,
            mem_gb: cpu * 2.0,
            gpu: 0,
            runtime_slots: runtime,
            release_slot: 0,
            deadline_slot: deadline,
            data_gb: 0.0,
            affinity_regions: Vec::new(),
        }
    }

    fn flat_input(jobs: Vec<JobSpec>, regions_ci: &[(&str, f64)], horizon: u32) -> OptimizeInput {
        let mut capacities = Vec::new();
        let mut carbons = Vec::new();
        for (region, ci) in regions_ci {
            for slot in 0..horizon {
                capacities.push(ClusterCapacity {
                    region: (*region).to_string(),
                    slot,
                    cpu_cap: 64.0,
                    mem_gb_cap: 256.0,
                    gpu_cap: 0.0,
                });
                carbons.push(CarbonPoint {
                    region: (*region).to_string(),
                    slot,
                    ci_gco2_per_kwh: *ci,
                });
            }
        }

        OptimizeInput {
            jobs,
            capacities,
            carbons,
            regions: regions_ci.iter().map(|(r, _)| (*r).to_string()).collect(),
            slot_seconds: 300.0,
            horizon_slots: horizon,
            costs: BTreeMap::new(),
            network_costs: BTreeMap::new(),
            migration_allow: true,
            prev_plan: BTreeMap::new(),
        }
    }

    #[test]
    fn test_empty_jobs_is_optimal() {
        let solver = MilpSolver::new();
        let out = solver.solve(&flat_input(Vec::new(), &[("CA", 100.0)], 12));
        assert_eq!(out.solver_status, SolverStatus::Optimal);
        assert!(out.plans.is_empty());
        assert_eq!(out.migrations, 0);
    }

    #[test]
    fn test_picks_cleanest_region() {
        let solver = MilpSolver::new();
        let input = flat_input(
            vec![job("j1", 4.0, 6, 12)],
            &[("CA", 100.0), ("CN", 600.0)],
            12,
        );

        let out = solver.solve(&input);
        assert_eq!(out.solver_status, SolverStatus::Optimal);
        assert_eq!(out.plans[0].region, "CA");
    }

    #[test]
    fn test_carbon_estimate_matches_coefficients() {
        let solver = MilpSolver::new();
        let input = flat_input(vec![job("j1", 4.0, 6, 12)], &[("CA", 100.0)], 12);

        let out = solver.solve(&input);
        // 6 slots x 100 gCO2/kWh x 4 cores x 30 W x (300/3600) h / 1000 = 6 g
        assert!((out.co2_estimate_kg - 0.006).abs() < 1e-9);
        assert_eq!(out.carbon_co2_estimate_kg, out.co2_estimate_kg);
    }

    #[test]
    fn test_migration_counted_and_penalized_in_score() {
        let solver = MilpSolver::new();
        let mut input = flat_input(
            vec![job("j1", 4.0, 6, 12)],
            &[("JP", 600.0), ("KR", 100.0)],
            12,
        );
        input.prev_plan.insert("j1".to_string(), "JP".to_string());

        let out = solver.solve(&input);
        // The carbon gap (36g vs 6g) dwarfs the 100g penalty, so it moves.
        assert_eq!(out.plans[0].region, "KR");
        assert_eq!(out.migrations, 1);
        assert!(out.co2_estimate_kg > out.carbon_co2_estimate_kg);
    }

    #[test]
    fn test_migration_forbidden_when_disallowed() {
        let solver = MilpSolver::new();
        let mut input = flat_input(
            vec![job("j1", 4.0, 6, 12)],
            &[("JP", 600.0), ("KR", 100.0)],
            12,
        );
        input.prev_plan.insert("j1".to_string(), "JP".to_string());
        input.migration_allow = false;

        let out = solver.solve(&input);
        assert_eq!(out.plans[0].region, "JP");
        assert_eq!(out.migrations, 0);
    }

    #[test]
    fn test_infeasible_deadline_falls_back() {
        let solver = MilpSolver::new();
        // runtime 6 with deadline 4 admits no start slot at all
        let input = flat_input(vec![job("j1", 4.0, 6, 4)], &[("CA", 100.0)], 12);

        let out = solver.solve(&input);
        assert_eq!(out.solver_status, SolverStatus::Infeasible);
        assert_eq!(out.plans[0].region, "CA");
        assert_eq!(out.plans[0].start_slot, 0);
    }

    #[test]
    fn test_fallback_output_counts_migrations() {
        let mut input = flat_input(vec![job("j1", 4.0, 6, 12)], &[("CA", 100.0)], 12);
        input.prev_plan.insert("j1".to_string(), "CN".to_string());

        let out = fallback_output(&input, SolverStatus::TimeLimit);
        assert_eq!(out.solver_status, SolverStatus::TimeLimit);
        assert_eq!(out.plans[0].region, "CA");
        assert_eq!(out.migrations, 1);
    }
}
