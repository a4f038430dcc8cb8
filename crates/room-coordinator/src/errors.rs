//! Coordinator error types.
//!
//! Errors map to numeric client error codes; internal details are logged
//! server-side and never forwarded to clients. Every failure is contained to
//! the originating connection — nothing in this layer is fatal to the
//! process.

use relay_core::RelayError;
use thiserror::Error;

/// Session-coordination error type.
///
/// Client error codes:
/// - `Unauthorized`: 2
/// - `RoomNotFound`: 4
/// - `TransportNotFound`: 4
/// - `TransportAllocation`, `Relay`, `Config`, `Internal`: 6
/// - `Draining`: 7
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Room lookup failed to resolve an owner: the room does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// The relay engine rejected transport allocation (resource exhaustion)
    /// or allocation timed out.
    #[error("transport allocation failed: {0}")]
    TransportAllocation(String),

    /// No transport registered for the requested (room, user, direction) —
    /// typically a stale or duplicate request after disconnect.
    #[error("transport not found: {0}")]
    TransportNotFound(String),

    /// Event sender identity does not match the registered session.
    /// Dropped silently at the fan-out layer; never broadcast.
    #[error("unauthorized action")]
    Unauthorized,

    /// Unexpected relay-engine failure.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The coordinator is draining (graceful shutdown).
    #[error("coordinator is draining")]
    Draining,

    /// Internal coordination error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Numeric error code sent alongside client-visible `error` events.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            CoordinatorError::Unauthorized => 2,
            CoordinatorError::RoomNotFound(_) | CoordinatorError::TransportNotFound(_) => 4,
            CoordinatorError::TransportAllocation(_)
            | CoordinatorError::Relay(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => 6,
            CoordinatorError::Draining => 7,
        }
    }

    /// Client-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            CoordinatorError::RoomNotFound(_) => "Room not found".to_string(),
            CoordinatorError::TransportAllocation(_) => {
                "Media transport allocation failed, please retry".to_string()
            }
            CoordinatorError::TransportNotFound(_) => "Media transport not found".to_string(),
            CoordinatorError::Unauthorized => "Unauthorized".to_string(),
            CoordinatorError::Relay(RelayError::ProducerNotFound(_)) => {
                "Producer not found".to_string()
            }
            CoordinatorError::Relay(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => "An internal error occurred".to_string(),
            CoordinatorError::Draining => "Server is shutting down, please reconnect".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(CoordinatorError::Unauthorized.error_code(), 2);
        assert_eq!(
            CoordinatorError::RoomNotFound("room-1".to_string()).error_code(),
            4
        );
        assert_eq!(
            CoordinatorError::TransportNotFound("room-1:user-1:send".to_string()).error_code(),
            4
        );
        assert_eq!(
            CoordinatorError::TransportAllocation("capacity".to_string()).error_code(),
            6
        );
        assert_eq!(
            CoordinatorError::Internal("oops".to_string()).error_code(),
            6
        );
        assert_eq!(CoordinatorError::Draining.error_code(), 7);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = CoordinatorError::Internal("relay at 10.0.0.7:4443 refused".to_string());
        assert!(!err.client_message().contains("10.0.0.7"));
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = CoordinatorError::Config("bad ROOM_DIRECTORY entry".to_string());
        assert!(!err.client_message().contains("ROOM_DIRECTORY"));
    }

    #[test]
    fn test_relay_error_conversion() {
        let err: CoordinatorError = RelayError::ProducerNotFound("p-1".to_string()).into();
        assert!(matches!(err, CoordinatorError::Relay(_)));
        assert_eq!(err.client_message(), "Producer not found");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", CoordinatorError::RoomNotFound("room-9".to_string())),
            "room not found: room-9"
        );
        assert_eq!(
            format!("{}", CoordinatorError::Draining),
            "coordinator is draining"
        );
    }
}
