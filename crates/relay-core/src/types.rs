//! Descriptor types for relay-engine endpoints.
//!
//! These are the values handed back to clients during transport negotiation.
//! Field names serialize in camelCase to match the client wire format.

use serde::{Deserialize, Serialize};

/// Direction class of a transport, relative to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    /// Client-to-relay media (the client's producers live here).
    Send,
    /// Relay-to-client media (the client's consumers live here).
    Recv,
}

impl TransportDirection {
    /// Direction as a lowercase string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportDirection::Send => "send",
            TransportDirection::Recv => "recv",
        }
    }
}

/// Media kind of a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Kind as a lowercase string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// ICE credentials negotiated for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    pub ice_lite: bool,
}

/// A single ICE candidate offered by the relay engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
}

/// DTLS role for the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    Auto,
    Client,
    Server,
}

/// A certificate fingerprint advertised during DTLS negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// DTLS parameters for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsParameters {
    pub role: DtlsRole,
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// A negotiated network endpoint for one direction class of media.
///
/// Returned to the client so it can complete ICE/DTLS negotiation against the
/// relay engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub transport_id: String,
    pub direction: TransportDirection,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// A media sink bound to a receive transport, forwarding one remote
/// producer's stream.
///
/// Fully populated on success; consume failures never yield a partial
/// descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub consumer_id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransportDirection::Send).unwrap(),
            "\"send\""
        );
        assert_eq!(
            serde_json::to_string(&TransportDirection::Recv).unwrap(),
            "\"recv\""
        );
    }

    #[test]
    fn test_media_kind_round_trip() {
        let kind: MediaKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(kind, MediaKind::Video);
        assert_eq!(kind.as_str(), "video");
    }

    #[test]
    fn test_transport_descriptor_camel_case_fields() {
        let descriptor = TransportDescriptor {
            transport_id: "t-1".to_string(),
            direction: TransportDirection::Send,
            ice_parameters: IceParameters {
                username_fragment: "ufrag".to_string(),
                password: "pwd".to_string(),
                ice_lite: true,
            },
            ice_candidates: vec![],
            dtls_parameters: DtlsParameters {
                role: DtlsRole::Auto,
                fingerprints: vec![],
            },
        };

        let json = serde_json::to_value(&descriptor).unwrap();
        assert!(json.get("transportId").is_some());
        assert!(json.get("iceParameters").is_some());
        assert!(json["iceParameters"].get("usernameFragment").is_some());
        assert!(json.get("dtlsParameters").is_some());
    }
}
