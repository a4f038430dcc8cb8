//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth thresholds per actor type:
//!
//! | Actor Type  | Normal | Warning | Critical |
//! |-------------|--------|---------|----------|
//! | Room        | < 100  | 100-500 | > 500    |
//! | Connection  | < 50   | 50-200  | > 200    |
//!
//! Gauges and counters are exported with the `rc_` prefix through the
//! Prometheus recorder installed at startup.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Mailbox depth thresholds for room actors.
pub const ROOM_MAILBOX_NORMAL: usize = 100;
pub const ROOM_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for connection actors.
pub const CONNECTION_MAILBOX_NORMAL: usize = 50;
pub const CONNECTION_MAILBOX_WARNING: usize = 200;

/// Actor type for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `CoordinatorActor` (singleton).
    Coordinator,
    /// `RoomActor` (one per live room).
    Room,
    /// `ConnectionActor` (one per socket).
    Connection,
}

impl ActorType {
    /// Label value for metrics and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Coordinator => "coordinator",
            ActorType::Room => "room",
            ActorType::Connection => "connection",
        }
    }

    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Coordinator | ActorType::Room => ROOM_MAILBOX_WARNING,
            ActorType::Connection => CONNECTION_MAILBOX_WARNING,
        }
    }

    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Coordinator | ActorType::Room => ROOM_MAILBOX_NORMAL,
            ActorType::Connection => CONNECTION_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Tracks one actor's mailbox depth and throughput.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message entering the mailbox loop.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if self.level_for_depth(new_depth) == MailboxLevel::Critical {
            warn!(
                target: "rc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                threshold = self.actor_type.warning_threshold(),
                "Mailbox depth critical"
            );
        }
    }

    /// Record a message leaving the mailbox loop (processed).
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "rc_actor_messages_processed_total",
            "actor_type" => self.actor_type.as_str()
        )
        .increment(1);
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated gauges for the actor system, shared across actors and read by
/// the status endpoint.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    active_rooms: AtomicUsize,
    active_connections: AtomicUsize,
    actor_panics: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_created(&self) {
        let rooms = self.active_rooms.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("rc_active_rooms").set(rooms as f64);
    }

    pub fn room_removed(&self) {
        let rooms = self.active_rooms.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::gauge!("rc_active_rooms").set(rooms as f64);
    }

    pub fn connection_registered(&self) {
        let connections = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("rc_active_connections").set(connections as f64);
    }

    pub fn connection_removed(&self) {
        let connections = self
            .active_connections
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        metrics::gauge!("rc_active_connections").set(connections as f64);
    }

    /// Record an actor panic detected through its `JoinHandle`.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "rc_actor_panics_total",
            "actor_type" => actor_type.as_str()
        )
        .increment(1);
        tracing::error!(
            target: "rc.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.active_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.actor_panics.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_as_str() {
        assert_eq!(ActorType::Coordinator.as_str(), "coordinator");
        assert_eq!(ActorType::Room.as_str(), "room");
        assert_eq!(ActorType::Connection.as_str(), "connection");
    }

    #[test]
    fn test_mailbox_monitor_depth_tracking() {
        let monitor = MailboxMonitor::new(ActorType::Room, "room-1");
        assert_eq!(monitor.current_depth(), 0);

        monitor.record_enqueue();
        monitor.record_enqueue();
        assert_eq!(monitor.current_depth(), 2);

        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 1);
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_mailbox_levels() {
        let monitor = MailboxMonitor::new(ActorType::Connection, "conn-1");
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        for _ in 0..75 {
            monitor.record_enqueue();
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        for _ in 0..150 {
            monitor.record_enqueue();
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);
    }

    #[test]
    fn test_actor_metrics_counts() {
        let metrics = ActorMetrics::new();

        metrics.room_created();
        metrics.room_created();
        metrics.connection_registered();
        assert_eq!(metrics.room_count(), 2);
        assert_eq!(metrics.connection_count(), 1);

        metrics.room_removed();
        metrics.connection_removed();
        assert_eq!(metrics.room_count(), 1);
        assert_eq!(metrics.connection_count(), 0);
    }

    #[test]
    fn test_panic_accounting() {
        let metrics = ActorMetrics::new();
        metrics.record_panic(ActorType::Room);
        metrics.record_panic(ActorType::Connection);
        assert_eq!(metrics.panic_count(), 2);
    }
}
