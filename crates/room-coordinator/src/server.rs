//! Signaling server.
//!
//! Accepts WebSocket connections on `/signaling`, parses client event frames,
//! and routes them to the actor hierarchy. Each socket gets a connection
//! actor for outbound delivery and a writer task draining the outbound
//! channel into the socket, so a slow client never blocks a room loop.

use crate::actors::{ConnectionActor, ConnectionActorHandle, CoordinatorActorHandle, JoinProfile};
use crate::actors::metrics::ActorMetrics;
use crate::actors::RoomActorHandle;
use crate::events::{ClientEvent, ServerEvent};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const OUTBOUND_CHANNEL_SIZE: usize = 256;

/// Shared server state handed to every socket task.
#[derive(Clone)]
pub struct ServerState {
    pub coordinator: CoordinatorActorHandle,
    pub metrics: Arc<ActorMetrics>,
    pub shutdown_token: CancellationToken,
}

/// Build the signaling router.
pub fn signaling_router(state: ServerState) -> Router {
    Router::new()
        .route("/signaling", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(
        target: "rc.server",
        connection_id = %connection_id,
        "WebSocket connected"
    );
    state.metrics.connection_registered();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CHANNEL_SIZE);

    // Writer pump: the only task touching the socket's write half.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let (connection, connection_task) = ConnectionActor::spawn(
        connection_id.clone(),
        outbound_tx,
        &state.shutdown_token,
    );

    let mut joined: Option<RoomActorHandle> = None;

    while let Some(message) = ws_receiver.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let event = match serde_json::from_str::<ClientEvent>(&frame) {
            Ok(event) => event,
            Err(err) => {
                debug!(
                    target: "rc.server",
                    connection_id = %connection_id,
                    error = %err,
                    "Dropping malformed frame"
                );
                connection.deliver(ServerEvent::Error {
                    code: 6,
                    message: "Malformed event".to_string(),
                });
                continue;
            }
        };

        dispatch_event(&state, &connection_id, &connection, &mut joined, event).await;
    }

    info!(
        target: "rc.server",
        connection_id = %connection_id,
        "WebSocket disconnected"
    );

    // Unwind the session; the room broadcasts the departure and releases
    // this connection's media.
    if let Some(room) = joined {
        room.disconnect(connection_id.clone()).await;
    }
    connection.close("socket closed").await;
    connection.cancel();
    let _ = connection_task.await;
    writer.abort();
    state.metrics.connection_removed();
}

async fn dispatch_event(
    state: &ServerState,
    connection_id: &str,
    connection: &ConnectionActorHandle,
    joined: &mut Option<RoomActorHandle>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinRoom {
            room_id,
            user_id,
            username,
            avatar,
            is_muted,
        } => {
            let room = match state.coordinator.resolve_room(&room_id).await {
                Ok(room) => room,
                Err(err) => {
                    warn!(
                        target: "rc.server",
                        connection_id = %connection_id,
                        room_id = %room_id,
                        error = %err,
                        "Room resolution failed"
                    );
                    connection.deliver(ServerEvent::Error {
                        code: err.error_code(),
                        message: err.client_message(),
                    });
                    return;
                }
            };

            // Switching rooms: unwind the previous membership first so the
            // old room releases this connection's session and media.
            if let Some(previous) = joined.take() {
                if previous.room_id() != room.room_id() {
                    previous.disconnect(connection_id.to_string()).await;
                }
            }

            let profile = JoinProfile {
                connection_id: connection_id.to_string(),
                user_id,
                username,
                avatar,
                is_muted,
            };
            if let Err(err) = room.join(profile, connection.clone()).await {
                connection.deliver(ServerEvent::Error {
                    code: err.error_code(),
                    message: err.client_message(),
                });
            }
            // The session stays registered even when provisioning failed;
            // keep the handle so a later disconnect still unwinds it.
            *joined = Some(room);
        }

        ClientEvent::ChatMessage {
            room_id,
            user_id,
            content,
        } => {
            if let Some(room) = joined_room(connection, joined, Some(&room_id)) {
                room.chat(connection_id.to_string(), user_id, content).await;
            }
        }

        ClientEvent::ToggleMute {
            room_id,
            user_id,
            is_muted,
        } => {
            if let Some(room) = joined_room(connection, joined, Some(&room_id)) {
                room.toggle_mute(connection_id.to_string(), user_id, is_muted)
                    .await;
            }
        }

        ClientEvent::ConnectTransport {
            request_id,
            direction,
            dtls_parameters,
        } => {
            if let Some(room) = joined_room(connection, joined, None) {
                room.connect_transport(
                    connection_id.to_string(),
                    request_id,
                    direction,
                    dtls_parameters,
                )
                .await;
            }
        }

        ClientEvent::Produce {
            request_id,
            kind,
            rtp_parameters,
        } => {
            if let Some(room) = joined_room(connection, joined, None) {
                room.produce(connection_id.to_string(), request_id, kind, rtp_parameters)
                    .await;
            }
        }

        ClientEvent::Consume {
            request_id,
            producer_id,
            rtp_capabilities,
        } => {
            if let Some(room) = joined_room(connection, joined, None) {
                room.consume(
                    connection_id.to_string(),
                    request_id,
                    producer_id,
                    rtp_capabilities,
                )
                .await;
            }
        }
    }
}

/// Resolve the connection's joined room, optionally checking the event's
/// claimed room id against it. Events sent before joining (or naming a
/// different room) are answered with a scoped error.
fn joined_room<'a>(
    connection: &ConnectionActorHandle,
    joined: &'a Option<RoomActorHandle>,
    claimed_room_id: Option<&str>,
) -> Option<&'a RoomActorHandle> {
    let Some(room) = joined.as_ref() else {
        connection.deliver(ServerEvent::Error {
            code: 4,
            message: "Join a room first".to_string(),
        });
        return None;
    };
    if let Some(claimed) = claimed_room_id {
        if claimed != room.room_id() {
            connection.deliver(ServerEvent::Error {
                code: 4,
                message: "Room mismatch".to_string(),
            });
            return None;
        }
    }
    Some(room)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::MediaTransportManager;
    use crate::lookup::StaticRoomDirectory;
    use relay_core::LocalRelayEngine;
    use std::time::Duration;

    fn server_state(
        engine: Arc<LocalRelayEngine>,
        rooms: &[(&str, &str)],
    ) -> ServerState {
        let media = Arc::new(MediaTransportManager::new(
            engine as Arc<dyn relay_core::RelayEngine>,
        ));
        let lookup = Arc::new(StaticRoomDirectory::from_pairs(
            rooms
                .iter()
                .map(|(room, owner)| ((*room).to_string(), (*owner).to_string())),
        ));
        let metrics = ActorMetrics::new();
        let shutdown_token = CancellationToken::new();
        let (coordinator, _task) = CoordinatorActorHandle::spawn(
            lookup,
            media,
            Arc::clone(&metrics),
            &shutdown_token,
            100,
            Duration::from_secs(5),
        );
        ServerState {
            coordinator,
            metrics,
            shutdown_token,
        }
    }

    fn join_event(room_id: &str, user_id: &str) -> ClientEvent {
        ClientEvent::JoinRoom {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            avatar: format!("{user_id}.png"),
            is_muted: false,
        }
    }

    async fn room_count(state: &ServerState) -> usize {
        state.coordinator.get_status().await.unwrap().room_count
    }

    #[tokio::test]
    async fn test_switching_rooms_unwinds_previous_membership() {
        let engine = Arc::new(LocalRelayEngine::default());
        let state = server_state(Arc::clone(&engine), &[("room-a", "alice"), ("room-b", "alice")]);
        let (outbound_tx, _outbound_rx) = mpsc::channel(64);
        let (connection, _task) =
            ConnectionActor::spawn("conn-1".to_string(), outbound_tx, &state.shutdown_token);
        let mut joined = None;

        dispatch_event(&state, "conn-1", &connection, &mut joined, join_event("room-a", "alice"))
            .await;
        let room_a = joined.clone().expect("joined room-a");
        assert_eq!(room_a.room_id(), "room-a");
        assert_eq!(engine.transport_count(), 2);

        dispatch_event(&state, "conn-1", &connection, &mut joined, join_event("room-b", "alice"))
            .await;
        assert_eq!(joined.as_ref().map(RoomActorHandle::room_id), Some("room-b"));

        // room-a lost its only session: its media is released and the
        // coordinator reaps the empty room.
        let mut reaped = false;
        for _ in 0..50 {
            if room_count(&state).await == 1 {
                reaped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(reaped, "previous room was never removed");
        assert_eq!(engine.transport_count(), 2, "room-a transports leaked");
    }

    #[tokio::test]
    async fn test_rejoining_same_room_keeps_membership() {
        let engine = Arc::new(LocalRelayEngine::default());
        let state = server_state(Arc::clone(&engine), &[("room-a", "alice")]);
        let (outbound_tx, _outbound_rx) = mpsc::channel(64);
        let (connection, _task) =
            ConnectionActor::spawn("conn-1".to_string(), outbound_tx, &state.shutdown_token);
        let mut joined = None;

        dispatch_event(&state, "conn-1", &connection, &mut joined, join_event("room-a", "alice"))
            .await;
        dispatch_event(&state, "conn-1", &connection, &mut joined, join_event("room-a", "alice"))
            .await;

        let room = joined.expect("still joined");
        let snapshot = room.get_state().await.expect("room alive");
        assert_eq!(snapshot.session_count, 1);
        assert_eq!(engine.transport_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_join_keeps_room_handle_for_disconnect() {
        // Capacity 1: the transport pair allocation always fails.
        let engine = Arc::new(LocalRelayEngine::new(1));
        let state = server_state(Arc::clone(&engine), &[("room-a", "alice")]);
        let (outbound_tx, _outbound_rx) = mpsc::channel(64);
        let (connection, _task) =
            ConnectionActor::spawn("conn-1".to_string(), outbound_tx, &state.shutdown_token);
        let mut joined = None;

        dispatch_event(&state, "conn-1", &connection, &mut joined, join_event("room-a", "alice"))
            .await;

        // The session is parked server-side; the handle must survive so the
        // eventual socket close unwinds it.
        let room = joined.expect("room handle retained after failed join");
        let snapshot = room.get_state().await.expect("room alive");
        assert_eq!(snapshot.session_count, 1);

        room.disconnect("conn-1".to_string()).await;
        let mut reaped = false;
        for _ in 0..50 {
            if room_count(&state).await == 0 {
                reaped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(reaped, "room was never reaped after disconnect");
    }
}
