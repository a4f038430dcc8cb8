//! Service entry point.
//!
//! Wires the relay engine, media manager, room directory, and actor
//! hierarchy together, then serves signaling and health on separate ports
//! until SIGTERM/ctrl-c triggers a graceful drain.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_core::LocalRelayEngine;
use room_coordinator::actors::{ActorMetrics, CoordinatorActorHandle};
use room_coordinator::observability::{health_router, HealthState};
use room_coordinator::server::{signaling_router, ServerState};
use room_coordinator::{Config, MediaTransportManager, StaticRoomDirectory};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        target: "rc.main",
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        "Starting room coordinator"
    );

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let engine = Arc::new(LocalRelayEngine::new(config.relay_max_transports));
    let media = Arc::new(MediaTransportManager::new(engine));
    let lookup = Arc::new(StaticRoomDirectory::from_pairs(
        config.room_directory.iter().cloned(),
    ));
    let metrics = ActorMetrics::new();
    let shutdown_token = CancellationToken::new();

    let (coordinator, coordinator_task) = CoordinatorActorHandle::spawn(
        lookup,
        media,
        Arc::clone(&metrics),
        &shutdown_token,
        config.max_rooms,
        config.allocation_timeout,
    );

    let health = Arc::new(HealthState::new());

    let signaling = signaling_router(ServerState {
        coordinator: coordinator.clone(),
        metrics,
        shutdown_token: shutdown_token.clone(),
    });
    let health_app = health_router(Arc::clone(&health), coordinator.clone(), prometheus);

    let signaling_listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    let health_listener = tokio::net::TcpListener::bind(&config.health_bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.health_bind_address))?;

    let signaling_server = tokio::spawn({
        let token = shutdown_token.clone();
        async move {
            axum::serve(signaling_listener, signaling)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
        }
    });
    let health_server = tokio::spawn({
        let token = shutdown_token.clone();
        async move {
            axum::serve(health_listener, health_app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
        }
    });

    health.set_ready(true);
    info!(target: "rc.main", "Room coordinator ready");

    shutdown_signal().await;
    info!(target: "rc.main", "Shutdown signal received, draining");
    health.set_ready(false);
    coordinator.shutdown();
    shutdown_token.cancel();

    if let Err(err) = coordinator_task.await {
        error!(target: "rc.main", error = %err, "Coordinator task ended abnormally");
    }
    for (name, server) in [("signaling", signaling_server), ("health", health_server)] {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(target: "rc.main", server = name, error = %err, "Server error"),
            Err(err) => error!(target: "rc.main", server = name, error = %err, "Server task panicked"),
        }
    }

    info!(target: "rc.main", "Room coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target: "rc.main", error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
