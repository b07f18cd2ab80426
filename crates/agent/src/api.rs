//! HTTP API: liveness and readiness, Prometheus metrics and the monitor query surface

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use monitor_lib::{
    alert::AlertFilter,
    health::ComponentStatus,
    models::{HealthCheckResult, OverallStatus},
    monitor::{ApplicationErrorReport, MonitorState},
    observability::MonitorMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<MonitorState>,
    pub metrics: MonitorMetrics,
}

impl AppState {
    pub fn new(monitor: Arc<MonitorState>, metrics: MonitorMetrics) -> Self {
        Self { monitor, metrics }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    status: ComponentStatus,
    overall_status: OverallStatus,
    components: BTreeMap<String, HealthCheckResult>,
}

/// Liveness: the process is up, so always 200. The body carries the
/// component verdicts and the overall fleet status.
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.monitor.registry().health().await;
    let overall_status = state.monitor.current_health().overall_status;

    (
        StatusCode::OK,
        Json(LivenessResponse {
            status: health.status,
            overall_status,
            components: health.components,
        }),
    )
}

/// Readiness check response - returns 200 once the first view is published
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.monitor.registry().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.current_health().as_ref().clone())
}

async fn get_system(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.current_health().system.clone() {
        Some(system) => Json(system).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No host metrics collected yet"),
    }
}

async fn get_docker(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.current_health().docker.clone() {
        Some(docker) => Json(docker).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No container status collected yet"),
    }
}

async fn get_runners(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.current_health().runners.clone())
}

async fn get_checks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.checks().await)
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AlertFilter>,
) -> impl IntoResponse {
    Json(state.monitor.list_alerts(&filter).await)
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.monitor.acknowledge(&id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

async fn report_application_error(
    State(state): State<Arc<AppState>>,
    Json(report): Json<ApplicationErrorReport>,
) -> Response {
    if report.subject.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "subject must not be empty");
    }
    let transitions = state.monitor.report_application_error(report).await;
    (StatusCode::OK, Json(transitions)).into_response()
}

async fn clear_application_error(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
) -> Response {
    match state.monitor.clear_application_error(&subject).await {
        Some(transitions) => (StatusCode::OK, Json(transitions)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("no application error registered for {}", subject),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/health", get(get_health))
        .route("/api/v1/system", get(get_system))
        .route("/api/v1/docker", get(get_docker))
        .route("/api/v1/runners", get(get_runners))
        .route("/api/v1/checks", get(get_checks))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/v1/application-errors", post(report_application_error))
        .route(
            "/api/v1/application-errors/:subject",
            delete(clear_application_error),
        )
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
