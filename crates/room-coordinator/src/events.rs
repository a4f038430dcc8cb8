//! Client wire events.
//!
//! Tagged JSON frames exchanged over the signaling WebSocket:
//! `{"event": "join-room", "data": {...}}`. Payload fields are camelCase.
//!
//! Request/response pairs (connect-transport, produce, consume) carry a
//! client-generated `requestId`, answered with an `ack` event — the
//! WebSocket rendition of per-request acknowledgements.

use crate::registry::{SessionRole, SessionStatus};
use relay_core::{ConsumerDescriptor, DtlsParameters, MediaKind, TransportDescriptor, TransportDirection};
use serde::{Deserialize, Serialize};

/// Events received from a client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Request to join a room with self-reported identity.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        user_id: String,
        username: String,
        avatar: String,
        is_muted: bool,
    },

    /// Chat message; `user_id` must match the sender's registered session.
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: String,
        user_id: String,
        content: String,
    },

    /// Mute toggle; `user_id` must match the sender's registered session.
    #[serde(rename_all = "camelCase")]
    ToggleMute {
        room_id: String,
        user_id: String,
        is_muted: bool,
    },

    /// Complete DTLS negotiation for one of the sender's transports.
    #[serde(rename_all = "camelCase")]
    ConnectTransport {
        request_id: String,
        direction: TransportDirection,
        dtls_parameters: DtlsParameters,
    },

    /// Start producing media on the sender's send transport.
    #[serde(rename_all = "camelCase")]
    Produce {
        request_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    },

    /// Start consuming a remote producer on the sender's recv transport.
    #[serde(rename_all = "camelCase")]
    Consume {
        request_id: String,
        producer_id: String,
        rtp_capabilities: serde_json::Value,
    },
}

/// Ack payload for request/response client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AckPayload {
    TransportConnected,
    #[serde(rename_all = "camelCase")]
    ProducerCreated { producer_id: String },
    ConsumerCreated { consumer: ConsumerDescriptor },
}

/// Events pushed to client connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Transport pair descriptors for the requester.
    #[serde(rename_all = "camelCase")]
    SfuTransports {
        send_transport: TransportDescriptor,
        recv_transport: TransportDescriptor,
    },

    /// The requester's session status (ACTIVE or WAITING).
    SetStatus { status: SessionStatus },

    /// Identity and role confirmation for the requester.
    #[serde(rename_all = "camelCase")]
    SetCurrentUser {
        user_id: String,
        username: String,
        avatar: String,
        role: SessionRole,
    },

    /// The host joined; sent to the rest of the room.
    HostJoined,

    /// Host confirmation; sent to the host itself.
    HostStatus,

    /// The host left and the room's media was torn down.
    HostLeft,

    /// A participant joined an already-hosted room.
    #[serde(rename_all = "camelCase")]
    UserConnected {
        user_id: String,
        username: String,
        avatar: String,
        is_muted: bool,
    },

    /// A participant disconnected.
    #[serde(rename_all = "camelCase")]
    UserDisconnected { user_id: String },

    /// The requester joined before the host and is parked.
    WaitingForHost,

    /// Host-presence answer for a joining participant.
    #[serde(rename_all = "camelCase")]
    RoomStatus { host_present: bool },

    /// A participant's mute flag changed.
    #[serde(rename_all = "camelCase")]
    MuteStatus { user_id: String, is_muted: bool },

    /// Chat fan-out to every connection in the room.
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        message_id: String,
        user_id: String,
        username: String,
        avatar: String,
        content: String,
        timestamp: i64,
    },

    /// A new producer appeared; the rest of the room may consume it.
    #[serde(rename_all = "camelCase")]
    NewProducer { producer_id: String, user_id: String },

    /// Scoped failure, delivered to the requester only.
    #[serde(rename_all = "camelCase")]
    Error { code: i32, message: String },

    /// Response to a requestId-carrying client event.
    #[serde(rename_all = "camelCase")]
    Ack {
        request_id: String,
        payload: AckPayload,
    },
}
