//! In-process relay engine for development and tests.
//!
//! `LocalRelayEngine` performs no packet routing; it only mimics the control
//! plane: it mints descriptors with freshly generated ICE/DTLS material and
//! tracks transport/producer/consumer liveness so that lifecycle rules
//! (allocation caps, stale producer ids, idempotent close) behave like a real
//! engine.

use crate::engine::{RelayEngine, RelayError};
use crate::types::{
    ConsumerDescriptor, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters,
    MediaKind, TransportDescriptor, TransportDirection,
};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Default transport capacity when none is configured.
const DEFAULT_MAX_TRANSPORTS: usize = 1024;

#[derive(Debug)]
struct TransportRecord {
    direction: TransportDirection,
    connected: bool,
}

#[derive(Debug)]
struct ProducerRecord {
    transport_id: String,
    kind: MediaKind,
    rtp_parameters: serde_json::Value,
}

#[derive(Debug)]
struct ConsumerRecord {
    transport_id: String,
    producer_id: String,
}

#[derive(Debug, Default)]
struct EngineState {
    transports: HashMap<String, TransportRecord>,
    producers: HashMap<String, ProducerRecord>,
    consumers: HashMap<String, ConsumerRecord>,
}

/// In-process [`RelayEngine`] implementation.
#[derive(Debug)]
pub struct LocalRelayEngine {
    state: Mutex<EngineState>,
    max_transports: usize,
}

impl Default for LocalRelayEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRANSPORTS)
    }
}

impl LocalRelayEngine {
    /// Create an engine that refuses allocation beyond `max_transports`
    /// simultaneously live transports.
    #[must_use]
    pub fn new(max_transports: usize) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            max_transports,
        }
    }

    /// Number of currently live transports.
    #[must_use]
    pub fn transport_count(&self) -> usize {
        self.lock().transports.len()
    }

    /// Number of currently live producers.
    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.lock().producers.len()
    }

    /// Number of currently live consumers.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.lock().consumers.len()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // State mutation never panics while the lock is held, but recover
        // from poisoning anyway rather than propagating a panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn random_string(len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn mint_descriptor(direction: TransportDirection) -> TransportDescriptor {
        let mut rng = rand::thread_rng();
        TransportDescriptor {
            transport_id: uuid::Uuid::new_v4().to_string(),
            direction,
            ice_parameters: IceParameters {
                username_fragment: Self::random_string(8),
                password: Self::random_string(24),
                ice_lite: true,
            },
            ice_candidates: vec![IceCandidate {
                foundation: "udpcandidate".to_string(),
                priority: 1_076_302_079,
                ip: "127.0.0.1".to_string(),
                port: rng.gen_range(40_000..50_000),
                protocol: "udp".to_string(),
            }],
            dtls_parameters: DtlsParameters {
                role: DtlsRole::Auto,
                fingerprints: vec![DtlsFingerprint {
                    algorithm: "sha-256".to_string(),
                    value: Self::random_fingerprint(),
                }],
            },
        }
    }

    fn random_fingerprint() -> String {
        let mut rng = rand::thread_rng();
        let bytes: Vec<String> = (0..32).map(|_| format!("{:02X}", rng.gen::<u8>())).collect();
        bytes.join(":")
    }
}

#[async_trait]
impl RelayEngine for LocalRelayEngine {
    async fn create_transport(
        &self,
        room_id: &str,
        user_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, RelayError> {
        let descriptor = Self::mint_descriptor(direction);

        {
            let mut state = self.lock();
            if state.transports.len() >= self.max_transports {
                return Err(RelayError::AllocationFailed(format!(
                    "transport capacity {} reached",
                    self.max_transports
                )));
            }
            state.transports.insert(
                descriptor.transport_id.clone(),
                TransportRecord {
                    direction,
                    connected: false,
                },
            );
        }

        debug!(
            target: "relay.local",
            room_id = %room_id,
            user_id = %user_id,
            direction = direction.as_str(),
            transport_id = %descriptor.transport_id,
            "Transport allocated"
        );

        Ok(descriptor)
    }

    async fn connect_transport(
        &self,
        transport_id: &str,
        _dtls_parameters: DtlsParameters,
    ) -> Result<(), RelayError> {
        let mut state = self.lock();
        let record = state
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| RelayError::TransportNotFound(transport_id.to_string()))?;
        record.connected = true;
        Ok(())
    }

    async fn create_producer(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<String, RelayError> {
        let mut state = self.lock();
        let record = state
            .transports
            .get(transport_id)
            .ok_or_else(|| RelayError::TransportNotFound(transport_id.to_string()))?;
        if record.direction != TransportDirection::Send {
            return Err(RelayError::Engine(format!(
                "transport {transport_id} is not a send transport"
            )));
        }

        let producer_id = uuid::Uuid::new_v4().to_string();
        state.producers.insert(
            producer_id.clone(),
            ProducerRecord {
                transport_id: transport_id.to_string(),
                kind,
                rtp_parameters,
            },
        );
        Ok(producer_id)
    }

    async fn create_consumer(
        &self,
        transport_id: &str,
        producer_id: &str,
        _rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumerDescriptor, RelayError> {
        let mut state = self.lock();
        if !state.transports.contains_key(transport_id) {
            return Err(RelayError::TransportNotFound(transport_id.to_string()));
        }
        let (kind, rtp_parameters) = match state.producers.get(producer_id) {
            Some(producer) => (producer.kind, producer.rtp_parameters.clone()),
            None => return Err(RelayError::ProducerNotFound(producer_id.to_string())),
        };

        let consumer_id = uuid::Uuid::new_v4().to_string();
        state.consumers.insert(
            consumer_id.clone(),
            ConsumerRecord {
                transport_id: transport_id.to_string(),
                producer_id: producer_id.to_string(),
            },
        );

        Ok(ConsumerDescriptor {
            consumer_id,
            producer_id: producer_id.to_string(),
            kind,
            rtp_parameters,
        })
    }

    async fn close_transport(&self, transport_id: &str) -> Result<(), RelayError> {
        let mut state = self.lock();
        if state.transports.remove(transport_id).is_none() {
            // Idempotent: closing an unknown transport is a no-op.
            return Ok(());
        }
        state
            .producers
            .retain(|_, producer| producer.transport_id != transport_id);
        state
            .consumers
            .retain(|_, consumer| consumer.transport_id != transport_id);

        debug!(target: "relay.local", transport_id = %transport_id, "Transport closed");
        Ok(())
    }
}
