//! Hub REST API
//!
//! JSON surface for operators and Spoke agents: cluster registration,
//! AppWrapper submission and inspection, manual cycle triggers, carbon
//! views, stats, and Prometheus exposition.

use crate::dispatcher::HubDispatcher;
use crate::models::{AppWrapper, AppWrapperSpec, ClusterInfo};
use crate::scheduler::HubScheduler;
use crate::spoke::SpokeJobs;
use crate::store::HubStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;
use verdant_carbon::{CarbonMonitor, CarbonProvider};
use verdant_common::HubError;
use verdant_optimizer::PlacementSolver;

/// Shared handles behind every endpoint
pub struct ApiState<P, S, K> {
    pub store: Arc<HubStore>,
    pub monitor: Arc<CarbonMonitor<P>>,
    pub scheduler: Arc<HubScheduler<S>>,
    pub dispatcher: Arc<HubDispatcher<K>>,
    pub metrics: PrometheusHandle,
}

impl<P, S, K> Clone for ApiState<P, S, K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            monitor: Arc::clone(&self.monitor),
            scheduler: Arc::clone(&self.scheduler),
            dispatcher: Arc::clone(&self.dispatcher),
            metrics: self.metrics.clone(),
        }
    }
}

/// Build the hub API router.
pub fn router<P, S, K>(state: ApiState<P, S, K>) -> Router
where
    P: CarbonProvider + 'static,
    S: PlacementSolver + 'static,
    K: SpokeJobs + 'static,
{
    Router::new()
        .route(
            "/hub/clusters",
            post(register_cluster::<P, S, K>).get(list_clusters::<P, S, K>),
        )
        .route("/hub/clusters/{name}", get(get_cluster::<P, S, K>))
        .route(
            "/hub/appwrappers",
            post(submit_appwrapper::<P, S, K>).get(list_appwrappers::<P, S, K>),
        )
        .route(
            "/hub/appwrappers/{id}",
            get(get_appwrapper::<P, S, K>).delete(delete_appwrapper::<P, S, K>),
        )
        .route("/hub/schedule", post(trigger_schedule::<P, S, K>))
        .route("/hub/dispatch", post(trigger_dispatch::<P, S, K>))
        .route("/hub/carbon", get(carbon_zones::<P, S, K>))
        .route("/hub/carbon/best", get(carbon_best::<P, S, K>))
        .route("/hub/stats", get(stats::<P, S, K>))
        .route("/metrics", get(prometheus::<P, S, K>))
        .route("/health", get(health::<P, S, K>))
        .with_state(state)
}

fn error_response(err: &HubError) -> Response {
    let status = match err {
        HubError::DuplicateJobId(_) | HubError::InvalidTransition { .. } => StatusCode::CONFLICT,
        HubError::NotFound(_) | HubError::UnknownCluster(_) => StatusCode::NOT_FOUND,
        HubError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "detail": err.to_string() }))).into_response()
}

fn bad_body(rejection: &JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "detail": rejection.to_string() })),
    )
        .into_response()
}

async fn register_cluster<P, S, K>(
    State(state): State<ApiState<P, S, K>>,
    body: Result<Json<ClusterInfo>, JsonRejection>,
) -> Response {
    let Json(info) = match body {
        Ok(json) => json,
        Err(rejection) => return bad_body(&rejection),
    };
    if let Err(e) = info.validate() {
        return error_response(&e);
    }

    let name = info.name.clone();
    state.store.update_cluster_info(info);
    Json(json!({ "status": "registered", "cluster": name })).into_response()
}

async fn list_clusters<P, S, K>(State(state): State<ApiState<P, S, K>>) -> Json<Vec<ClusterInfo>> {
    Json(state.store.get_all_clusters())
}

async fn get_cluster<P, S, K>(
    State(state): State<ApiState<P, S, K>>,
    Path(name): Path<String>,
) -> Response {
    match state.store.get_cluster_info(&name) {
        Some(info) => Json(info).into_response(),
        None => error_response(&HubError::UnknownCluster(name)),
    }
}

async fn submit_appwrapper<P, S, K>(
    State(state): State<ApiState<P, S, K>>,
    body: Result<Json<AppWrapperSpec>, JsonRejection>,
) -> Response {
    let Json(spec) = match body {
        Ok(json) => json,
        Err(rejection) => return bad_body(&rejection),
    };
    if let Err(e) = spec.validate() {
        return error_response(&e);
    }

    match state.store.add_appwrapper(AppWrapper::submitted(spec)) {
        Ok(job_id) => Json(json!({ "status": "submitted", "job_id": job_id })).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn list_appwrappers<P, S, K>(
    State(state): State<ApiState<P, S, K>>,
) -> Json<Vec<AppWrapper>> {
    Json(state.store.get_all_appwrappers())
}

async fn get_appwrapper<P, S, K>(
    State(state): State<ApiState<P, S, K>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_appwrapper(&id) {
        Some(aw) => Json(aw).into_response(),
        None => error_response(&HubError::NotFound(id)),
    }
}

async fn delete_appwrapper<P, S, K>(
    State(state): State<ApiState<P, S, K>>,
    Path(id): Path<String>,
) -> Response {
    if state.store.remove_appwrapper(&id) {
        Json(json!({ "status": "removed", "job_id": id })).into_response()
    } else {
        error_response(&HubError::NotFound(id))
    }
}

async fn trigger_schedule<P, S, K>(State(state): State<ApiState<P, S, K>>) -> Response
where
    S: PlacementSolver + 'static,
{
    let decisions = state.scheduler.run_cycle().await;
    Json(json!({ "status": "completed", "decisions": decisions })).into_response()
}

async fn trigger_dispatch<P, S, K>(State(state): State<ApiState<P, S, K>>) -> Response
where
    K: SpokeJobs + 'static,
{
    let dispatched = state.dispatcher.run_cycle().await;
    Json(json!({ "status": "completed", "dispatched": dispatched })).into_response()
}

async fn carbon_zones<P, S, K>(State(state): State<ApiState<P, S, K>>) -> Response
where
    P: CarbonProvider + 'static,
{
    Json(state.monitor.latest()).into_response()
}

async fn carbon_best<P, S, K>(State(state): State<ApiState<P, S, K>>) -> Response
where
    P: CarbonProvider + 'static,
{
    match state.monitor.best() {
        Some(best) => Json(best).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": "no carbon data available yet" })),
        )
            .into_response(),
    }
}

async fn stats<P, S, K>(State(state): State<ApiState<P, S, K>>) -> Response {
    Json(state.store.stats()).into_response()
}

async fn prometheus<P, S, K>(State(state): State<ApiState<P, S, K>>) -> Response {
    state.metrics.render().into_response()
}

async fn health<P, S, K>(State(_state): State<ApiState<P, S, K>>) -> Response {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}
