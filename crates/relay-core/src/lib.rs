//! Relay engine control-plane contract.
//!
//! The session-coordination layer never routes media itself; an external
//! selective-forwarding relay engine does the packet work. This crate defines
//! the control-plane surface the coordinator drives:
//!
//! - Descriptor types for negotiated endpoints ([`TransportDescriptor`],
//!   [`ConsumerDescriptor`], ICE/DTLS parameter structs)
//! - The [`RelayEngine`] trait, the only async I/O boundary in the core
//! - [`LocalRelayEngine`], an in-process engine for development and tests
//!
//! RTP parameters and capabilities are carried as opaque JSON: the
//! coordinator proxies them verbatim between clients and the engine and never
//! interprets their contents.

pub mod engine;
pub mod local;
pub mod types;

pub use engine::{RelayEngine, RelayError};
pub use local::LocalRelayEngine;
pub use types::{
    ConsumerDescriptor, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters,
    MediaKind, TransportDescriptor, TransportDirection,
};
