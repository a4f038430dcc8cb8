//! Health and status endpoints, served off the signaling port.

pub mod health;

pub use health::{health_router, HealthState};
