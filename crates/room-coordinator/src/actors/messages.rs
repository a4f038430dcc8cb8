//! Actor message types.
//!
//! Every request that needs an answer carries a oneshot `respond_to` channel;
//! fire-and-forget notifications carry none. Messages flow strictly down the
//! hierarchy (coordinator -> room -> connection), with the single upward
//! exception of the room-empty notification.

use crate::actors::connection::ConnectionActorHandle;
use crate::actors::room::RoomActorHandle;
use crate::errors::CoordinatorError;
use crate::registry::{SessionRole, SessionStatus};
use relay_core::{DtlsParameters, MediaKind, TransportDirection};
use serde::Serialize;
use tokio::sync::oneshot;

/// Profile fields a client self-reports when joining.
#[derive(Debug, Clone)]
pub struct JoinProfile {
    pub connection_id: String,
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub is_muted: bool,
}

/// Role and status assigned by the room at join time.
#[derive(Debug, Clone, Copy)]
pub struct JoinOutcome {
    pub role: SessionRole,
    pub status: SessionStatus,
}

/// Snapshot of coordinator-level counts for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub room_count: usize,
    pub connection_count: usize,
    pub is_draining: bool,
}

/// Messages handled by the `CoordinatorActor`.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// Resolve `room_id` and return a handle to its (possibly just-spawned)
    /// room actor. The caller drives the join against the room itself, so
    /// relay allocation never blocks the coordinator loop.
    ResolveRoom {
        room_id: String,
        respond_to: oneshot::Sender<Result<RoomActorHandle, CoordinatorError>>,
    },

    /// A room actor's registry went empty; drop it from the supervision map.
    RoomEmpty { room_id: String },

    /// Status snapshot for observability endpoints.
    GetStatus {
        respond_to: oneshot::Sender<CoordinatorStatus>,
    },
}

/// Messages handled by a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Register (or refresh) a session and run the join state machine.
    Join {
        profile: JoinProfile,
        connection: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<JoinOutcome, CoordinatorError>>,
    },

    /// Fan a chat message out to the whole room.
    Chat {
        connection_id: String,
        claimed_user_id: String,
        content: String,
    },

    /// Toggle the sender's mute flag and broadcast the change.
    ToggleMute {
        connection_id: String,
        claimed_user_id: String,
        is_muted: bool,
    },

    /// Complete DTLS negotiation on one of the sender's transports.
    ConnectTransport {
        connection_id: String,
        request_id: String,
        direction: TransportDirection,
        dtls_parameters: DtlsParameters,
    },

    /// Create a producer on the sender's send transport.
    Produce {
        connection_id: String,
        request_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    },

    /// Create a consumer on the sender's recv transport.
    Consume {
        connection_id: String,
        request_id: String,
        producer_id: String,
        rtp_capabilities: serde_json::Value,
    },

    /// The connection's socket closed (or errored); unwind its session.
    Disconnect { connection_id: String },

    /// Membership snapshot, used by tests and the status endpoint.
    GetState {
        respond_to: oneshot::Sender<RoomStateSnapshot>,
    },
}

/// Point-in-time view of a room's membership.
#[derive(Debug, Clone)]
pub struct RoomStateSnapshot {
    pub room_id: String,
    pub session_count: usize,
    pub host_present: bool,
    pub waiting_count: usize,
}

/// Messages handled by a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Serialize and push a server event to the socket writer.
    Deliver(crate::events::ServerEvent),

    /// Stop the actor; the socket is going away.
    Close { reason: &'static str },
}
