//! Verdant Optimizer - carbon-aware placement as a mixed-integer program
//!
//! Translates a batch of jobs, per-slot cluster capacities, and per-slot
//! carbon intensities into a time-indexed binary placement model and solves
//! it for minimum carbon plus migration cost.

mod schema;
mod solver;

pub use schema::{
    CarbonPoint, ClusterCapacity, JobSpec, OptimizeInput, OptimizeOutput, PlanItem, SolverStatus,
};
pub use solver::{MilpSolver, PlacementSolver, fallback_output};
