//! Health and status endpoint behavior.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_core::LocalRelayEngine;
use room_coordinator::actors::{ActorMetrics, CoordinatorActorHandle};
use room_coordinator::observability::{health_router, HealthState};
use room_coordinator::{MediaTransportManager, StaticRoomDirectory};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn build_router() -> (Router, Arc<HealthState>) {
    let engine = Arc::new(LocalRelayEngine::default());
    let media = Arc::new(MediaTransportManager::new(
        engine as Arc<dyn relay_core::RelayEngine>,
    ));
    let lookup = Arc::new(StaticRoomDirectory::new());
    let token = CancellationToken::new();
    let (coordinator, _task) = CoordinatorActorHandle::spawn(
        lookup,
        media,
        ActorMetrics::new(),
        &token,
        100,
        Duration::from_secs(5),
    );

    let health = Arc::new(HealthState::new());
    let prometheus = PrometheusBuilder::new().build_recorder().handle();
    let router = health_router(Arc::clone(&health), coordinator, prometheus);
    (router, health)
}

async fn get(router: &Router, path: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn liveness_is_always_ok() {
    let (router, _health) = build_router();
    let (status, _) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn readiness_follows_the_flag() {
    let (router, health) = build_router();

    let (status, _) = get(&router, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    health.set_ready(true);
    let (status, _) = get(&router, "/ready").await;
    assert_eq!(status, StatusCode::OK);

    health.set_ready(false);
    let (status, _) = get(&router, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn status_reports_coordinator_counts() {
    let (router, _health) = build_router();
    let (status, body) = get(&router, "/status").await;
    assert_eq!(status, StatusCode::OK);

    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["room_count"], 0);
    assert_eq!(value["is_draining"], false);
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let (router, _health) = build_router();
    let (status, _) = get(&router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}
