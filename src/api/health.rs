/// Health and metrics endpoints
///
/// - `/health`: liveness, always 200 while the process serves requests
/// - `/health/ready`: readiness, 503 when the database is unreachable
/// - `/metrics`: Prometheus text exposition
use crate::{context::AppContext, db, error::DirectoryResult, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    /// "ready" or "unavailable"
    pub status: String,
    pub version: String,
    pub database: ComponentHealth,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
        .route("/metrics", get(metrics_handler))
}

/// Basic liveness check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe: checks database connectivity
pub async fn readiness_probe(State(ctx): State<AppContext>) -> (StatusCode, Json<ReadinessStatus>) {
    let start = Instant::now();

    let database = match db::test_connection(&ctx.db).await {
        Ok(()) => ComponentHealth {
            status: "healthy".to_string(),
            response_time_ms: start.elapsed().as_millis() as u64,
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed: database check failed");
            ComponentHealth {
                status: "unhealthy".to_string(),
                response_time_ms: start.elapsed().as_millis() as u64,
                error: Some(e.public_message()),
            }
        }
    };

    let ready = database.status == "healthy";
    let body = ReadinessStatus {
        status: if ready { "ready" } else { "unavailable" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    };

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(body))
}

/// Prometheus metrics in text format
pub async fn metrics_handler() -> DirectoryResult<impl IntoResponse> {
    let body = metrics::render_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
