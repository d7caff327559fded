//! Optional HTTP endpoint, served only when `api_port` is configured
//!
//! - `/healthz`: the monitor loop is alive. A degraded `nvidia-smi` or
//!   `docker` source still answers 200, because the loop keeps cycling
//!   through tool failures. Only a stopped loop answers 503.
//! - `/readyz`: at least one cycle has completed end to end.
//! - `/metrics`: Prometheus text exposition of the cycle and action counters.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use monitor_lib::health::{ComponentStatus, HealthRegistry};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{info, warn};

const TEXT_PLAIN: (&str, &str) = ("content-type", "text/plain; charset=utf-8");

/// State shared with the handlers; the scheduler holds a clone of the same registry
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self { health_registry }
    }
}

fn liveness_code(status: ComponentStatus) -> StatusCode {
    match status {
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    (liveness_code(health.status), Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (StatusCode::OK, [TEXT_PLAIN], buffer),
        Err(e) => {
            warn!(error = %e, "Failed to encode monitor metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [TEXT_PLAIN],
                e.to_string().into_bytes(),
            )
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until the listener fails. Runs beside the scheduler and is dropped
/// with the runtime at shutdown.
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Serving monitor health and metrics");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
