//! Media transport manager.
//!
//! Owns the lifecycle of relay-engine transports, producers, and consumers,
//! keyed by structured composite keys — never `room:user:direction` string
//! concatenation. Shared across room actors behind an `Arc`; the internal
//! tables sit behind a `std::sync::Mutex` that is held only across map
//! access. Relay-engine awaits always happen outside the lock, so every
//! mutating operation over the maps is synchronous.
//!
//! Transports are never shared across rooms or users; a producer's or
//! consumer's lifetime is bounded by its owning transport's.

use crate::errors::CoordinatorError;
use relay_core::{
    ConsumerDescriptor, DtlsParameters, MediaKind, RelayEngine, RelayError, TransportDescriptor,
    TransportDirection,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Composite key for one transport: `(room, user, direction)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportKey {
    pub room_id: String,
    pub user_id: String,
    pub direction: TransportDirection,
}

impl TransportKey {
    fn new(room_id: &str, user_id: &str, direction: TransportDirection) -> Self {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            direction,
        }
    }
}

/// Composite owner key for producers and consumers: `(room, user)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey {
    pub room_id: String,
    pub user_id: String,
}

impl MediaKey {
    fn new(room_id: &str, user_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// The send/recv descriptor pair returned to a joining client.
#[derive(Debug, Clone)]
pub struct TransportPair {
    pub send: TransportDescriptor,
    pub recv: TransportDescriptor,
}

#[derive(Debug)]
struct ProducerRecord {
    owner: MediaKey,
    user_id: String,
    kind: MediaKind,
}

#[derive(Debug, Default)]
struct MediaTables {
    /// Engine transport ids by composite key.
    transports: HashMap<TransportKey, String>,
    /// Producer owners by producer id.
    producers: HashMap<String, ProducerRecord>,
    /// Consumer owners by consumer id.
    consumers: HashMap<String, MediaKey>,
}

/// Bookkeeping and orchestration over the external relay engine.
pub struct MediaTransportManager {
    engine: Arc<dyn RelayEngine>,
    tables: Mutex<MediaTables>,
}

impl MediaTransportManager {
    #[must_use]
    pub fn new(engine: Arc<dyn RelayEngine>) -> Self {
        Self {
            engine,
            tables: Mutex::new(MediaTables::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MediaTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a send/recv transport pair for `(room, user)`.
    ///
    /// If the recv leg fails after the send leg succeeded, the send leg is
    /// closed engine-side before the error propagates — no half-allocated
    /// pairs. A pre-existing pair for the same key is closed and replaced.
    pub async fn create_transport_pair(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<TransportPair, CoordinatorError> {
        // Replace any stale pair from an earlier provisioning attempt.
        let stale: Vec<String> = {
            let mut tables = self.lock();
            [TransportDirection::Send, TransportDirection::Recv]
                .into_iter()
                .filter_map(|direction| {
                    tables
                        .transports
                        .remove(&TransportKey::new(room_id, user_id, direction))
                })
                .collect()
        };
        for transport_id in stale {
            warn!(
                target: "rc.media",
                room_id = %room_id,
                user_id = %user_id,
                transport_id = %transport_id,
                "Replacing stale transport"
            );
            let _ = self.engine.close_transport(&transport_id).await;
        }

        let send = self
            .engine
            .create_transport(room_id, user_id, TransportDirection::Send)
            .await
            .map_err(allocation_error)?;

        let recv = match self
            .engine
            .create_transport(room_id, user_id, TransportDirection::Recv)
            .await
        {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let _ = self.engine.close_transport(&send.transport_id).await;
                return Err(allocation_error(err));
            }
        };

        {
            let mut tables = self.lock();
            tables.transports.insert(
                TransportKey::new(room_id, user_id, TransportDirection::Send),
                send.transport_id.clone(),
            );
            tables.transports.insert(
                TransportKey::new(room_id, user_id, TransportDirection::Recv),
                recv.transport_id.clone(),
            );
        }

        debug!(
            target: "rc.media",
            room_id = %room_id,
            user_id = %user_id,
            send_transport = %send.transport_id,
            recv_transport = %recv.transport_id,
            "Transport pair allocated"
        );

        Ok(TransportPair { send, recv })
    }

    /// Complete DTLS negotiation for the user's transport in `direction`.
    pub async fn connect_transport(
        &self,
        room_id: &str,
        user_id: &str,
        direction: TransportDirection,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), CoordinatorError> {
        let transport_id = self.transport_id(room_id, user_id, direction)?;
        self.engine
            .connect_transport(&transport_id, dtls_parameters)
            .await?;
        Ok(())
    }

    /// Create a producer on the user's send transport. Returns the producer
    /// id; the caller broadcasts the new-producer notice.
    pub async fn produce(
        &self,
        room_id: &str,
        user_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<String, CoordinatorError> {
        let transport_id = self.transport_id(room_id, user_id, TransportDirection::Send)?;
        let producer_id = self
            .engine
            .create_producer(&transport_id, kind, rtp_parameters)
            .await?;

        self.lock().producers.insert(
            producer_id.clone(),
            ProducerRecord {
                owner: MediaKey::new(room_id, user_id),
                user_id: user_id.to_string(),
                kind,
            },
        );

        debug!(
            target: "rc.media",
            room_id = %room_id,
            user_id = %user_id,
            producer_id = %producer_id,
            kind = kind.as_str(),
            "Producer created"
        );

        Ok(producer_id)
    }

    /// Create a consumer for `producer_id` on the user's recv transport.
    ///
    /// A stale producer id surfaces as the engine's `ProducerNotFound`; the
    /// descriptor is only recorded (and returned) fully populated.
    pub async fn consume(
        &self,
        room_id: &str,
        user_id: &str,
        producer_id: &str,
        rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumerDescriptor, CoordinatorError> {
        let transport_id = self.transport_id(room_id, user_id, TransportDirection::Recv)?;
        let descriptor = self
            .engine
            .create_consumer(&transport_id, producer_id, rtp_capabilities)
            .await?;

        self.lock().consumers.insert(
            descriptor.consumer_id.clone(),
            MediaKey::new(room_id, user_id),
        );

        Ok(descriptor)
    }

    /// Close and remove both of the user's transports and every producer and
    /// consumer owned by `(room, user)`. Idempotent.
    pub async fn cleanup_user(&self, room_id: &str, user_id: &str) {
        let owner = MediaKey::new(room_id, user_id);
        let transport_ids: Vec<String> = {
            let mut tables = self.lock();
            tables.producers.retain(|_, record| record.owner != owner);
            tables.consumers.retain(|_, key| *key != owner);
            [TransportDirection::Send, TransportDirection::Recv]
                .into_iter()
                .filter_map(|direction| {
                    tables
                        .transports
                        .remove(&TransportKey::new(room_id, user_id, direction))
                })
                .collect()
        };

        for transport_id in &transport_ids {
            if let Err(err) = self.engine.close_transport(transport_id).await {
                warn!(
                    target: "rc.media",
                    room_id = %room_id,
                    user_id = %user_id,
                    transport_id = %transport_id,
                    error = %err,
                    "Failed to close transport during user cleanup"
                );
            }
        }

        if !transport_ids.is_empty() {
            debug!(
                target: "rc.media",
                room_id = %room_id,
                user_id = %user_id,
                closed = transport_ids.len(),
                "User media cleaned up"
            );
        }
    }

    /// Close and remove every transport, producer, and consumer keyed under
    /// `room_id`. Used only on host departure.
    pub async fn cleanup_room(&self, room_id: &str) {
        let transport_ids: Vec<String> = {
            let mut tables = self.lock();
            tables
                .producers
                .retain(|_, record| record.owner.room_id != room_id);
            tables.consumers.retain(|_, key| key.room_id != room_id);

            let doomed: Vec<TransportKey> = tables
                .transports
                .keys()
                .filter(|key| key.room_id == room_id)
                .cloned()
                .collect();
            doomed
                .into_iter()
                .filter_map(|key| tables.transports.remove(&key))
                .collect()
        };

        for transport_id in &transport_ids {
            if let Err(err) = self.engine.close_transport(transport_id).await {
                warn!(
                    target: "rc.media",
                    room_id = %room_id,
                    transport_id = %transport_id,
                    error = %err,
                    "Failed to close transport during room teardown"
                );
            }
        }

        debug!(
            target: "rc.media",
            room_id = %room_id,
            closed = transport_ids.len(),
            "Room media torn down"
        );
    }

    /// Number of live transports for `(room, user)` — at most 2.
    #[must_use]
    pub fn transport_count(&self, room_id: &str, user_id: &str) -> usize {
        let tables = self.lock();
        [TransportDirection::Send, TransportDirection::Recv]
            .into_iter()
            .filter(|direction| {
                tables
                    .transports
                    .contains_key(&TransportKey::new(room_id, user_id, *direction))
            })
            .count()
    }

    /// Live producers for a room as `(producer_id, user_id, kind)`.
    #[must_use]
    pub fn room_producers(&self, room_id: &str) -> Vec<(String, String, MediaKind)> {
        self.lock()
            .producers
            .iter()
            .filter(|(_, record)| record.owner.room_id == room_id)
            .map(|(id, record)| (id.clone(), record.user_id.clone(), record.kind))
            .collect()
    }

    fn transport_id(
        &self,
        room_id: &str,
        user_id: &str,
        direction: TransportDirection,
    ) -> Result<String, CoordinatorError> {
        self.lock()
            .transports
            .get(&TransportKey::new(room_id, user_id, direction))
            .cloned()
            .ok_or_else(|| {
                CoordinatorError::TransportNotFound(format!(
                    "no {} transport for user {user_id} in room {room_id}",
                    direction.as_str()
                ))
            })
    }
}

fn allocation_error(err: RelayError) -> CoordinatorError {
    match err {
        RelayError::AllocationFailed(msg) => CoordinatorError::TransportAllocation(msg),
        other => CoordinatorError::Relay(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use relay_core::{DtlsRole, LocalRelayEngine};

    fn manager_with(engine: Arc<LocalRelayEngine>) -> MediaTransportManager {
        MediaTransportManager::new(engine)
    }

    fn caps() -> serde_json::Value {
        serde_json::json!({ "codecs": [] })
    }

    fn dtls() -> DtlsParameters {
        DtlsParameters {
            role: DtlsRole::Client,
            fingerprints: vec![],
        }
    }

    #[tokio::test]
    async fn test_pair_allocation_yields_two_transports() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(Arc::clone(&engine));

        let pair = manager.create_transport_pair("room-1", "user-1").await.unwrap();
        assert_eq!(pair.send.direction, TransportDirection::Send);
        assert_eq!(pair.recv.direction, TransportDirection::Recv);
        assert_eq!(manager.transport_count("room-1", "user-1"), 2);
    }

    #[tokio::test]
    async fn test_failed_second_leg_rolls_back_first() {
        // Capacity 1: send leg succeeds, recv leg fails.
        let engine = Arc::new(LocalRelayEngine::new(1));
        let manager = manager_with(Arc::clone(&engine));

        let result = manager.create_transport_pair("room-1", "user-1").await;
        assert!(matches!(
            result,
            Err(CoordinatorError::TransportAllocation(_))
        ));
        assert_eq!(manager.transport_count("room-1", "user-1"), 0);
        assert_eq!(engine.transport_count(), 0, "send leg not rolled back");
    }

    #[tokio::test]
    async fn test_reallocation_replaces_stale_pair() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(Arc::clone(&engine));

        manager.create_transport_pair("room-1", "user-1").await.unwrap();
        manager.create_transport_pair("room-1", "user-1").await.unwrap();

        assert_eq!(manager.transport_count("room-1", "user-1"), 2);
        assert_eq!(engine.transport_count(), 2, "stale transports leaked");
    }

    #[tokio::test]
    async fn test_connect_without_transport_fails() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(engine);

        let result = manager
            .connect_transport("room-1", "user-1", TransportDirection::Send, dtls())
            .await;
        assert!(matches!(result, Err(CoordinatorError::TransportNotFound(_))));
    }

    #[tokio::test]
    async fn test_produce_and_consume_flow() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(engine);

        manager.create_transport_pair("room-1", "alice").await.unwrap();
        manager.create_transport_pair("room-1", "bob").await.unwrap();

        let producer_id = manager
            .produce("room-1", "alice", MediaKind::Video, caps())
            .await
            .unwrap();

        let producers = manager.room_producers("room-1");
        assert_eq!(producers.len(), 1);
        assert_eq!(producers[0].1, "alice");

        let consumer = manager
            .consume("room-1", "bob", &producer_id, caps())
            .await
            .unwrap();
        assert_eq!(consumer.producer_id, producer_id);
        assert_eq!(consumer.kind, MediaKind::Video);
    }

    #[tokio::test]
    async fn test_consume_stale_producer_never_partial() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(engine);
        manager.create_transport_pair("room-1", "bob").await.unwrap();

        let result = manager.consume("room-1", "bob", "gone", caps()).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Relay(RelayError::ProducerNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_user_is_scoped_and_idempotent() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(Arc::clone(&engine));

        manager.create_transport_pair("room-1", "alice").await.unwrap();
        manager.create_transport_pair("room-1", "bob").await.unwrap();
        manager
            .produce("room-1", "alice", MediaKind::Audio, caps())
            .await
            .unwrap();

        manager.cleanup_user("room-1", "alice").await;
        assert_eq!(manager.transport_count("room-1", "alice"), 0);
        assert!(manager.room_producers("room-1").is_empty());
        // Bob's media state is untouched.
        assert_eq!(manager.transport_count("room-1", "bob"), 2);

        // Second cleanup is a no-op.
        manager.cleanup_user("room-1", "alice").await;
        assert_eq!(manager.transport_count("room-1", "bob"), 2);
    }

    #[tokio::test]
    async fn test_cleanup_room_removes_everything_room_keyed() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(Arc::clone(&engine));

        manager.create_transport_pair("room-1", "alice").await.unwrap();
        manager.create_transport_pair("room-1", "bob").await.unwrap();
        manager.create_transport_pair("room-2", "carol").await.unwrap();
        manager
            .produce("room-1", "alice", MediaKind::Video, caps())
            .await
            .unwrap();

        manager.cleanup_room("room-1").await;

        assert_eq!(manager.transport_count("room-1", "alice"), 0);
        assert_eq!(manager.transport_count("room-1", "bob"), 0);
        assert!(manager.room_producers("room-1").is_empty());
        // Other rooms are untouched.
        assert_eq!(manager.transport_count("room-2", "carol"), 2);
        assert_eq!(engine.transport_count(), 2);
    }

    #[tokio::test]
    async fn test_produce_after_cleanup_fails() {
        let engine = Arc::new(LocalRelayEngine::default());
        let manager = manager_with(engine);

        manager.create_transport_pair("room-1", "alice").await.unwrap();
        manager.cleanup_user("room-1", "alice").await;

        let result = manager
            .produce("room-1", "alice", MediaKind::Audio, caps())
            .await;
        assert!(matches!(result, Err(CoordinatorError::TransportNotFound(_))));
    }
}
