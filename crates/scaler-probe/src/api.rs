//! Probe HTTP surface: trigger health, readiness and Prometheus text output

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use scaler_core::health::HealthRegistry;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct ProbeState {
    pub health: HealthRegistry,
}

impl ProbeState {
    pub fn new(health: HealthRegistry) -> Arc<Self> {
        Arc::new(Self { health })
    }
}

fn json_with_status<T: Serialize>(ok: bool, body: T) -> Response {
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// Degraded triggers still answer 200; only a failure streak turns it 503
async fn trigger_health(State(state): State<Arc<ProbeState>>) -> Response {
    let health = state.health.health().await;
    json_with_status(health.status.is_operational(), health)
}

async fn readiness(State(state): State<Arc<ProbeState>>) -> Response {
    let readiness = state.health.readiness().await;
    json_with_status(readiness.ready, readiness)
}

async fn prometheus_text() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer)
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode scaler metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router(state: Arc<ProbeState>) -> Router {
    Router::new()
        .route("/healthz", get(trigger_health))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_text))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    port: u16,
    state: Arc<ProbeState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind probe API on {addr}"))?;
    info!(addr = %addr, "Probe API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Probe API server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use scaler_core::health::components;
    use scaler_core::ScalerMetrics;
    use tower::ServiceExt;

    async fn probe_state() -> Arc<ProbeState> {
        let health = HealthRegistry::with_threshold(2);
        health.register(components::CONNECTION_POOL).await;
        health.register("s0-queueLength").await;
        ProbeState::new(health)
    }

    async fn get(state: Arc<ProbeState>, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn get_json(state: Arc<ProbeState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = get(state, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_healthy() {
        let (status, body) = get_json(probe_state().await, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_healthz_degraded_after_one_miss() {
        let state = probe_state().await;
        state
            .health
            .record_failure("s0-queueLength", "GetMetrics call timed out")
            .await;

        let (status, body) = get_json(state, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(
            body["components"]["s0-queueLength"]["consecutive_failures"],
            serde_json::json!(1)
        );
    }

    #[tokio::test]
    async fn test_healthz_unavailable_after_failure_streak() {
        let state = probe_state().await;
        for _ in 0..2 {
            state
                .health
                .record_failure("s0-queueLength", "scaler unavailable")
                .await;
        }

        let (status, body) = get_json(state, "/healthz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let state = probe_state().await;
        let (status, body) = get_json(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);

        state.health.set_ready(true).await;
        let (status, body) = get_json(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_exposes_scaler_counters() {
        ScalerMetrics::new().inc_rpc_error("GetMetrics");

        let (status, body) = get(probe_state().await, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("external_scaler_rpc_errors_total"));
    }
}
