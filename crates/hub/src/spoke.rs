//! Spoke cluster access: Kubernetes Job creation per kube-context
//!
//! The dispatcher talks to Spokes through the [`SpokeJobs`] trait so tests
//! can substitute a recording stub. The production implementation builds one
//! `kube` client per kubeconfig context, lazily, and caches it.

use crate::models::AppWrapper;
use k8s_openapi::api::batch::v1::{Job, JobSpec as KubeJobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::config::KubeConfigOptions;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Namespace Jobs are created in on every Spoke.
const JOB_NAMESPACE: &str = "default";

/// Result of a Job creation attempt on a Spoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The Job was created by this call
    Created,
    /// A Job with this name already existed (HTTP 409); dispatch is complete
    AlreadyExists,
}

/// Errors from Spoke cluster access
#[derive(Debug, Error)]
pub enum SpokeError {
    #[error("failed to build client for context {context}: {message}")]
    ClientConstruction { context: String, message: String },

    #[error("Kubernetes API error: {0}")]
    Api(String),
}

/// Job-creation interface to Spoke clusters
///
/// Declared with an explicit `Send` future so the dispatcher loop can run in
/// a spawned task; implementations just write `async fn`.
pub trait SpokeJobs: Send + Sync {
    fn create_job(
        &self,
        context: &str,
        job: &Job,
    ) -> impl Future<Output = Result<CreateOutcome, SpokeError>> + Send;
}

/// Production [`SpokeJobs`] backed by per-context `kube` clients
#[derive(Default)]
pub struct KubeSpokes {
    clients: RwLock<HashMap<String, kube::Client>>,
}

impl KubeSpokes {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client_for(&self, context: &str) -> Result<kube::Client, SpokeError> {
        if let Some(client) = self.clients.read().await.get(context) {
            return Ok(client.clone());
        }

        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..KubeConfigOptions::default()
        };
        let config = kube::Config::from_kubeconfig(&options)
            .await
            .map_err(|e| SpokeError::ClientConstruction {
                context: context.to_string(),
                message: e.to_string(),
            })?;
        let client =
            kube::Client::try_from(config).map_err(|e| SpokeError::ClientConstruction {
                context: context.to_string(),
                message: e.to_string(),
            })?;

        info!(context = %context, "Created Kubernetes client for Spoke");
        self.clients
            .write()
            .await
            .insert(context.to_string(), client.clone());
        Ok(client)
    }
}

impl SpokeJobs for KubeSpokes {
    #[instrument(skip(self, job))]
    async fn create_job(&self, context: &str, job: &Job) -> Result<CreateOutcome, SpokeError> {
        let client = self.client_for(context).await?;
        let api: Api<Job> = Api::namespaced(client, JOB_NAMESPACE);

        match api.create(&PostParams::default(), job).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!(context = %context, "Job already exists on Spoke, treating as dispatched");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(SpokeError::Api(e.to_string())),
        }
    }
}

/// Render the Kubernetes Job manifest for a decided AppWrapper.
pub fn build_job_manifest(aw: &AppWrapper) -> Job {
    let spec = &aw.spec;
    let target = spec.target_cluster.clone().unwrap_or_default();

    let labels = BTreeMap::from([
        ("app".to_string(), "verdant-workload".to_string()),
        ("job-id".to_string(), spec.job_id.clone()),
        ("scheduled-by".to_string(), "verdant-hub".to_string()),
    ]);
    let annotations = BTreeMap::from([
        ("verdant.io/target-cluster".to_string(), target),
        (
            "verdant.io/estimated-co2".to_string(),
            aw.metadata
                .get("estimated_co2_g")
                .cloned()
                .unwrap_or_else(|| "0".to_string()),
        ),
    ]);

    let resources = BTreeMap::from([
        ("cpu".to_string(), Quantity(format!("{}", spec.cpu))),
        ("memory".to_string(), Quantity(format!("{}Gi", spec.mem_gb))),
    ]);

    Job {
        metadata: ObjectMeta {
            name: Some(spec.job_id.clone()),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            ..ObjectMeta::default()
        },
        spec: Some(KubeJobSpec {
            backoff_limit: Some(3),
            ttl_seconds_after_finished: Some(3600),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(BTreeMap::from([
                        ("app".to_string(), "verdant-workload".to_string()),
                        ("job-id".to_string(), spec.job_id.clone()),
                    ])),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: "workload".to_string(),
                        image: Some(spec.image.clone()),
                        command: Some(spec.command.clone()),
                        resources: Some(ResourceRequirements {
                            requests: Some(resources.clone()),
                            limits: Some(resources),
                            ..ResourceRequirements::default()
                        }),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..KubeJobSpec::default()
        }),
        ..Job::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppWrapper, AppWrapperSpec};

    fn decided_appwrapper() -> AppWrapper {
        let mut aw = AppWrapper::submitted(AppWrapperSpec {
            job_id: "ml-training-1".to_string(),
            cpu: 4.0,
            mem_gb: 8.0,
            gpu: 0,
            runtime_minutes: 30,
            deadline_minutes: 60,
            data_gb: 1.0,
            affinity_clusters: Vec::new(),
            image: "busybox:latest".to_string(),
            command: vec!["sleep".to_string(), "3600".to_string()],
            target_cluster: None,
            dispatching_gates: Vec::new(),
        });
        aw.spec.target_cluster = Some("KR".to_string());
        aw.metadata
            .insert("estimated_co2_g".to_string(), "12.5".to_string());
        aw
    }

    #[test]
    fn test_manifest_identity_and_labels() {
        let job = build_job_manifest(&decided_appwrapper());

        assert_eq!(job.metadata.name.as_deref(), Some("ml-training-1"));
        let labels = job.metadata.labels.unwrap();
        assert_eq!(labels["app"], "verdant-workload");
        assert_eq!(labels["job-id"], "ml-training-1");
        assert_eq!(labels["scheduled-by"], "verdant-hub");

        let annotations = job.metadata.annotations.unwrap();
        assert_eq!(annotations["verdant.io/target-cluster"], "KR");
        assert_eq!(annotations["verdant.io/estimated-co2"], "12.5");
    }

    #[test]
    fn test_manifest_requests_equal_limits() {
        let job = build_job_manifest(&decided_appwrapper());
        let spec = job.spec.unwrap();

        assert_eq!(spec.backoff_limit, Some(3));
        assert_eq!(spec.ttl_seconds_after_finished, Some(3600));

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));

        let container = &pod.containers[0];
        assert_eq!(container.name, "workload");
        let resources = container.resources.as_ref().unwrap();
        let requests = resources.requests.as_ref().unwrap();
        let limits = resources.limits.as_ref().unwrap();
        assert_eq!(requests["cpu"], Quantity("4".to_string()));
        assert_eq!(requests["memory"], Quantity("8Gi".to_string()));
        assert_eq!(requests, limits);
    }
}
