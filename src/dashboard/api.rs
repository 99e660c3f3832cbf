use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::Dashboard;
use super::metrics;
use crate::errors::DashboardError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub gitlab_base_url: String,
    pub user_link_template: Option<String>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PlayJobRequest {
    #[serde(default, rename = "ref")]
    pub git_ref: String,
}

#[derive(Deserialize)]
pub struct PlayJobsRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    #[serde(rename = "gitLabBaseURL")]
    pub gitlab_base_url: String,
    pub user_link_template: String,
    pub protected_environments: Vec<String>,
}

// ── Error handling ────────────────────────────────────────────────────

/// Request failures surface to the GUI as `400 {"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    fn action(context: &str, err: DashboardError) -> Self {
        match err {
            DashboardError::InvalidQuery(msg) => ApiError::BadRequest(msg),
            other => ApiError::BadRequest(format!("{}: {}", context, other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("cannot parse request body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("cannot parse path: {}", rejection.body_text()))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/environments", get(list_environments))
        .route("/environments/{environment}/jobs", post(play_jobs_by_query))
        .route(
            "/environments/{environment}/projects/{project_id}/repository/branches",
            get(list_branches),
        )
        .route(
            "/environments/{environment}/projects/{project_id}/jobs",
            get(get_job).post(play_job),
        )
        .route(
            "/environments/{environment}/projects/{project_id}/deployments",
            get(list_deployments),
        )
        .route("/jobs", get(list_jobs))
        .route("/config", get(get_config))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .dashboard
        .render_metrics()
        .map_err(|e| ApiError::Internal(format!("cannot encode metrics: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, metrics::CONTENT_TYPE)], body))
}

async fn list_environments(State(state): State<SharedState>) -> impl IntoResponse {
    let environments = state.dashboard.environments().await;
    Json(serde_json::json!({ "environments": environments }))
}

async fn list_branches(
    State(state): State<SharedState>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((_environment, project_id)) = path?;
    let branches = state.dashboard.branches(project_id).await;
    Ok(Json(serde_json::json!({ "branches": branches })))
}

async fn play_job(
    State(state): State<SharedState>,
    path: Result<Path<(String, u64)>, PathRejection>,
    body: Result<Json<PlayJobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((environment, project_id)) = path?;
    let Json(req) = body?;
    if req.git_ref.is_empty() {
        return Err(ApiError::BadRequest("ref is empty".to_string()));
    }

    let job = state
        .dashboard
        .play_or_retry(project_id, &environment, &req.git_ref)
        .await
        .map_err(|e| ApiError::action("cannot create job", e))?;
    Ok(Json(serde_json::json!({ "job": job })))
}

async fn play_jobs_by_query(
    State(state): State<SharedState>,
    Path(environment): Path<String>,
    body: Result<Json<PlayJobsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    state
        .dashboard
        .play_or_retry_by_query(&environment, &req.query)
        .await
        .map_err(|e| ApiError::action("cannot start jobs", e))?;

    let jobs = state.dashboard.jobs().await;
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

async fn get_job(
    State(state): State<SharedState>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((environment, project_id)) = path?;
    let (job, _found) = state.dashboard.job(&environment, project_id).await;
    Ok(Json(serde_json::json!({ "job": job })))
}

async fn list_deployments(
    State(state): State<SharedState>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((environment, project_id)) = path?;
    let deployments = state
        .dashboard
        .project_deployments(&environment, project_id)
        .await
        .map_err(|e| ApiError::action("cannot get deployments", e))?;
    Ok(Json(serde_json::json!({ "deployments": deployments })))
}

async fn list_jobs(State(state): State<SharedState>) -> impl IntoResponse {
    let jobs = state.dashboard.jobs().await;
    Json(serde_json::json!({ "jobs": jobs }))
}

async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        gitlab_base_url: state.gitlab_base_url.clone(),
        user_link_template: state.user_link_template.clone().unwrap_or_default(),
        protected_environments: state.dashboard.protected_environments(),
    })
}
