//! Real-time session coordination and media routing for video rooms.
//!
//! The coordinator sits between clients' signaling WebSockets and an
//! external relay engine that forwards media. It owns:
//!
//! - the join state machine (host designation, waiting-room parking,
//!   promotion when the host arrives);
//! - per-room membership registries with identity-checked fan-out of chat,
//!   presence, and mute events;
//! - the lifecycle of relay transports, producers, and consumers.
//!
//! Rooms are isolated actors: an error or a slow client in one room never
//! touches another. Media never flows through this process; the relay engine
//! does the forwarding and this layer does the bookkeeping.

pub mod actors;
pub mod config;
pub mod errors;
pub mod events;
pub mod lookup;
pub mod media;
pub mod observability;
pub mod registry;
pub mod server;

pub use config::Config;
pub use errors::CoordinatorError;
pub use lookup::{RoomLookup, StaticRoomDirectory};
pub use media::MediaTransportManager;
pub use registry::{RoomRegistry, SessionRole, SessionStatus};
