//! Health endpoints.
//!
//! - `/health`: liveness. 200 while the process runs.
//! - `/ready`: readiness. 200 once the coordinator is serving and flips to
//!   503 when draining, so load balancers stop routing new sessions.
//! - `/status`: JSON snapshot of coordinator counts.
//! - `/metrics`: Prometheus exposition, rendered by the installed recorder.

use crate::actors::CoordinatorActorHandle;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared liveness/readiness flags.
#[derive(Debug)]
pub struct HealthState {
    ready: AtomicBool,
}

impl HealthState {
    /// Create a health state that reports not-ready until flipped.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        info!(target: "rc.health", ready, "Readiness changed");
        self.ready.store(ready, Ordering::Release);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct HealthRouterState {
    health: Arc<HealthState>,
    coordinator: CoordinatorActorHandle,
    prometheus: PrometheusHandle,
}

/// Build the health/status router.
pub fn health_router(
    health: Arc<HealthState>,
    coordinator: CoordinatorActorHandle,
    prometheus: PrometheusHandle,
) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .route("/status", get(status))
        .route("/metrics", get(metrics_text))
        .with_state(HealthRouterState {
            health,
            coordinator,
            prometheus,
        })
}

async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

async fn readiness(State(state): State<HealthRouterState>) -> impl IntoResponse {
    if state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status(State(state): State<HealthRouterState>) -> impl IntoResponse {
    match state.coordinator.get_status().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn metrics_text(State(state): State<HealthRouterState>) -> impl IntoResponse {
    state.prometheus.render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_flag() {
        let health = HealthState::new();
        assert!(!health.is_ready());
        health.set_ready(true);
        assert!(health.is_ready());
        health.set_ready(false);
        assert!(!health.is_ready());
    }
}
