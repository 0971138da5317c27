//! Hub data model: Spoke cluster state and AppWrapper lifecycle records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use verdant_common::{HubError, unix_now};

/// State of one dispatching gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    /// Dispatch allowed
    Open,
    /// Dispatch blocked
    #[default]
    Closed,
}

/// Reported health of a Spoke cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    #[default]
    Ready,
    NotReady,
    Unknown,
}

/// Resource totals and headroom reported by a Spoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResources {
    pub cpu_available: f64,
    pub cpu_total: f64,
    pub mem_available_gb: f64,
    pub mem_total_gb: f64,
    #[serde(default)]
    pub gpu_available: u32,
    #[serde(default)]
    pub gpu_total: u32,
}

/// Registration record for one Spoke cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterInfo {
    /// Cluster name; doubles as the carbon zone code (KR, JP, ...)
    pub name: String,
    pub geolocation: String,
    /// Current grid carbon intensity (gCO2/kWh)
    pub carbon_intensity: f64,
    #[serde(default)]
    pub status: ClusterStatus,
    pub resources: ClusterResources,
    /// Kubeconfig context used to reach this cluster
    pub kubeconfig_context: String,
    /// Unix seconds of the last update; stamped by the store when absent
    #[serde(default)]
    pub last_updated: Option<f64>,
}

impl ClusterInfo {
    pub fn validate(&self) -> Result<(), HubError> {
        if self.name.is_empty() {
            return Err(HubError::Validation("cluster name must not be empty".into()));
        }
        let r = &self.resources;
        if r.cpu_available > r.cpu_total
            || r.mem_available_gb > r.mem_total_gb
            || r.gpu_available > r.gpu_total
        {
            return Err(HubError::Validation(format!(
                "cluster {}: available resources exceed totals",
                self.name
            )));
        }
        Ok(())
    }
}

/// A named gate that must be open before an AppWrapper may dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchingGate {
    #[serde(default = "DispatchingGate::default_name")]
    pub name: String,
    #[serde(default)]
    pub status: GateStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DispatchingGate {
    fn default_name() -> String {
        "sustainability-gate".to_string()
    }
}

impl Default for DispatchingGate {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            status: GateStatus::Closed,
            reason: None,
        }
    }
}

fn default_image() -> String {
    "busybox:latest".to_string()
}

fn default_command() -> Vec<String> {
    vec!["sleep".to_string(), "3600".to_string()]
}

fn default_gates() -> Vec<DispatchingGate> {
    vec![DispatchingGate::default()]
}

/// Workload requirements and placement decision for one AppWrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppWrapperSpec {
    pub job_id: String,
    /// Required CPU cores
    pub cpu: f64,
    /// Required memory (GB)
    pub mem_gb: f64,
    #[serde(default)]
    pub gpu: u32,
    /// Expected runtime in minutes
    pub runtime_minutes: u32,
    /// Completion deadline in minutes
    pub deadline_minutes: u32,
    /// Data moved on migration (GB)
    #[serde(default)]
    pub data_gb: f64,
    /// Admissible clusters; empty means any
    #[serde(default)]
    pub affinity_clusters: Vec<String>,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    // Decided by the scheduler, never by the submitter.
    #[serde(default)]
    pub target_cluster: Option<String>,
    #[serde(default = "default_gates")]
    pub dispatching_gates: Vec<DispatchingGate>,
}

impl AppWrapperSpec {
    pub fn validate(&self) -> Result<(), HubError> {
        if self.job_id.is_empty() {
            return Err(HubError::Validation("job_id must not be empty".into()));
        }
        if self.cpu <= 0.0 || self.mem_gb <= 0.0 {
            return Err(HubError::Validation(format!(
                "job {}: cpu and mem_gb must be positive",
                self.job_id
            )));
        }
        if self.runtime_minutes == 0 || self.deadline_minutes == 0 {
            return Err(HubError::Validation(format!(
                "job {}: runtime and deadline must be positive",
                self.job_id
            )));
        }
        if self.data_gb < 0.0 {
            return Err(HubError::Validation(format!(
                "job {}: data_gb must be non-negative",
                self.job_id
            )));
        }
        Ok(())
    }
}

/// AppWrapper lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Observed status of an AppWrapper
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppWrapperStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub dispatched: bool,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub completion_time: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Unit of work tracked by the hub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppWrapper {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub spec: AppWrapperSpec,
    #[serde(default)]
    pub status: AppWrapperStatus,
}

impl AppWrapper {
    /// Wrap a freshly submitted spec: phase Pending, gates closed, no target.
    ///
    /// Placement fields chosen by the scheduler are cleared even if the
    /// submitter supplied them.
    pub fn submitted(mut spec: AppWrapperSpec) -> Self {
        spec.target_cluster = None;
        if spec.dispatching_gates.is_empty() {
            spec.dispatching_gates = default_gates();
        }
        for gate in &mut spec.dispatching_gates {
            gate.status = GateStatus::Closed;
            gate.reason = None;
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("submitted_at".to_string(), unix_now().to_string());

        Self {
            metadata,
            spec,
            status: AppWrapperStatus::default(),
        }
    }

    pub fn all_gates_open(&self) -> bool {
        self.spec
            .dispatching_gates
            .iter()
            .all(|g| g.status == GateStatus::Open)
    }

    /// Target decided, every gate open, not yet dispatched.
    pub fn is_dispatchable(&self) -> bool {
        self.spec.target_cluster.is_some() && !self.status.dispatched && self.all_gates_open()
    }

    /// Awaiting a placement decision: no target yet, or some gate still
    /// closed while the workload is Pending.
    pub fn is_pending(&self) -> bool {
        self.spec.target_cluster.is_none()
            || (!self.all_gates_open() && self.status.phase == Phase::Pending)
    }

    pub fn open_gates(&mut self, reason: &str) {
        for gate in &mut self.spec.dispatching_gates {
            gate.status = GateStatus::Open;
            gate.reason = Some(reason.to_string());
        }
    }
}

/// Placement decision produced by one scheduler cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingDecision {
    pub job_id: String,
    pub target_cluster: String,
    /// Planned start offset from the cycle, in minutes
    pub start_time_minutes: u32,
    /// Estimated emissions for the run (grams CO2)
    pub estimated_co2_g: f64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str) -> AppWrapperSpec {
        AppWrapperSpec {
            job_id: id.to_string(),
            cpu: 4.0,
            mem_gb: 8.0,
            gpu: 0,
            runtime_minutes: 30,
            deadline_minutes: 60,
            data_gb: 0.5,
            affinity_clusters: Vec::new(),
            image: default_image(),
            command: default_command(),
            target_cluster: None,
            dispatching_gates: default_gates(),
        }
    }

    #[test]
    fn test_submitted_resets_decision_fields() {
        let mut s = spec("job-1");
        s.target_cluster = Some("KR".to_string());
        s.dispatching_gates[0].status = GateStatus::Open;

        let aw = AppWrapper::submitted(s);
        assert!(aw.spec.target_cluster.is_none());
        assert!(!aw.all_gates_open());
        assert_eq!(aw.status.phase, Phase::Pending);
        assert!(!aw.status.dispatched);
        assert!(aw.metadata.contains_key("submitted_at"));
    }

    #[test]
    fn test_pending_and_dispatchable_transitions() {
        let mut aw = AppWrapper::submitted(spec("job-1"));
        assert!(aw.is_pending());
        assert!(!aw.is_dispatchable());

        aw.spec.target_cluster = Some("KR".to_string());
        aw.open_gates("low carbon window");
        assert!(!aw.is_pending());
        assert!(aw.is_dispatchable());

        aw.status.dispatched = true;
        aw.status.phase = Phase::Running;
        assert!(!aw.is_dispatchable());
        assert!(!aw.is_pending());
    }

    #[test]
    fn test_spec_validation() {
        assert!(spec("job-1").validate().is_ok());

        let mut bad = spec("job-2");
        bad.cpu = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = spec("job-3");
        bad.deadline_minutes = 0;
        assert!(bad.validate().is_err());

        let mut bad = spec("");
        bad.job_id = String::new();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_cluster_validation_rejects_overcommitted_availability() {
        let info = ClusterInfo {
            name: "KR".to_string(),
            geolocation: "Seoul".to_string(),
            carbon_intensity: 350.0,
            status: ClusterStatus::Ready,
            resources: ClusterResources {
                cpu_available: 32.0,
                cpu_total: 16.0,
                mem_available_gb: 64.0,
                mem_total_gb: 64.0,
                gpu_available: 0,
                gpu_total: 0,
            },
            kubeconfig_context: "kind-kr".to_string(),
            last_updated: None,
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_spec_rejects_unknown_fields() {
        let json = r#"{
            "job_id": "job-1",
            "cpu": 1.0,
            "mem_gb": 1.0,
            "runtime_minutes": 10,
            "deadline_minutes": 20,
            "surprise": true
        }"#;
        assert!(serde_json::from_str::<AppWrapperSpec>(json).is_err());
    }

    #[test]
    fn test_gate_defaults() {
        let gate = DispatchingGate::default();
        assert_eq!(gate.name, "sustainability-gate");
        assert_eq!(gate.status, GateStatus::Closed);
    }
}
