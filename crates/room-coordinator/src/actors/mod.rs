//! Actor hierarchy: coordinator -> rooms -> connections.
//!
//! Each actor owns its state exclusively and communicates over bounded mpsc
//! mailboxes; cancellation tokens form a tree so shutting down a parent stops
//! every descendant.

pub mod connection;
pub mod coordinator;
pub mod messages;
pub mod metrics;
pub mod room;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use coordinator::CoordinatorActorHandle;
pub use messages::{CoordinatorStatus, JoinOutcome, JoinProfile};
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use room::RoomActorHandle;
