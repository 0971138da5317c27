//! Verdant Hub - carbon-aware multi-cluster workload scheduling
//!
//! The hub registers Spoke clusters, polls grid carbon intensity per region,
//! plans AppWrapper placements with a time-indexed optimization model, and
//! dispatches the decided workloads to the chosen Spoke as Kubernetes Jobs.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod spoke;
pub mod store;
pub mod sync;

pub use config::HubConfig;
pub use dispatcher::HubDispatcher;
pub use lifecycle::Shutdown;
pub use models::{
    AppWrapper, AppWrapperSpec, AppWrapperStatus, ClusterInfo, ClusterResources, ClusterStatus,
    DispatchingGate, GateStatus, Phase, SchedulingDecision,
};
pub use scheduler::{HubScheduler, SchedulerConfig};
pub use spoke::{CreateOutcome, KubeSpokes, SpokeError, SpokeJobs};
pub use store::{HubStats, HubStore};
