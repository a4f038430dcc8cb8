//! The [`RelayEngine`] trait and its error taxonomy.
//!
//! Every method is async I/O against the external media relay; these calls
//! are the only suspension points the coordination layer performs while
//! holding a room's attention. Implementations must be safe to call
//! concurrently from multiple room actors.

use crate::types::{
    ConsumerDescriptor, DtlsParameters, MediaKind, TransportDescriptor, TransportDirection,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the relay engine's control plane.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The engine refused to allocate a transport (resource exhaustion,
    /// routing capacity, or engine-side policy).
    #[error("transport allocation failed: {0}")]
    AllocationFailed(String),

    /// No transport with the given id exists on the engine.
    #[error("transport not found: {0}")]
    TransportNotFound(String),

    /// No producer with the given id exists on the engine. This is the
    /// pinned error shape for `consume` against a stale producer id.
    #[error("producer not found: {0}")]
    ProducerNotFound(String),

    /// Any other engine-side failure.
    #[error("relay engine error: {0}")]
    Engine(String),
}

/// Control-plane API of the external selective-forwarding relay engine.
///
/// The coordinator orchestrates this API; actual audio/video packet routing
/// happens entirely engine-side.
#[async_trait]
pub trait RelayEngine: Send + Sync {
    /// Allocate a transport for `(room_id, user_id)` in the given direction.
    async fn create_transport(
        &self,
        room_id: &str,
        user_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, RelayError>;

    /// Complete DTLS negotiation for an existing transport.
    async fn connect_transport(
        &self,
        transport_id: &str,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), RelayError>;

    /// Create a producer on a send transport. Returns the producer id.
    async fn create_producer(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<String, RelayError>;

    /// Create a consumer on a recv transport, forwarding `producer_id`.
    ///
    /// Fails with [`RelayError::ProducerNotFound`] if the producer no longer
    /// exists; never returns a partially populated descriptor.
    async fn create_consumer(
        &self,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumerDescriptor, RelayError>;

    /// Close a transport and everything attached to it (producers and
    /// consumers bound to the transport). Idempotent: closing an unknown
    /// transport is a no-op.
    async fn close_transport(&self, transport_id: &str) -> Result<(), RelayError>;
}
