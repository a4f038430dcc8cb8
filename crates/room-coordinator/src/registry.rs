//! Room membership registry.
//!
//! A `RoomRegistry` is owned exclusively by its room's actor — the single
//! writer — which is what makes the fan-out guarantee hold: a connection's
//! broadcast target is exactly the connections sharing its room.
//!
//! The host designation is a single optional slot, never a set; at most one
//! connection holds it at any instant. Removing the host clears the slot but
//! does not remove other sessions — they stay registered (media-less) until
//! they disconnect or rejoin.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role assigned to a session at join time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// The session whose user identity matches the room's owning user.
    Host,
    /// Any other participant.
    Joinee,
}

/// Connection state within the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Full participant; media transports may be provisioned.
    Active,
    /// Joined before the host; parked until the host arrives.
    Waiting,
}

/// One live connection's membership record.
#[derive(Debug, Clone)]
pub struct Session {
    /// Connection identifier (socket-scoped, not user-scoped).
    pub connection_id: String,
    /// Self-reported user identity, fixed at registration.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Avatar reference.
    pub avatar: String,
    /// Current mute flag.
    pub is_muted: bool,
    /// Assigned role.
    pub role: SessionRole,
    /// Current status.
    pub status: SessionStatus,
}

/// In-memory membership state for one room.
///
/// All operations are synchronous in-memory mutation with no I/O. Operations
/// on an unknown connection id return `None`/`false`, never an error.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    sessions: HashMap<String, Session>,
    host: Option<String>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert of a session record.
    ///
    /// A re-join from a connection that already has a session refreshes the
    /// profile fields but preserves the assigned role and status.
    pub fn register_session(
        &mut self,
        connection_id: &str,
        user_id: &str,
        display_name: &str,
        avatar: &str,
        is_muted: bool,
    ) {
        self.sessions
            .entry(connection_id.to_string())
            .and_modify(|session| {
                session.user_id = user_id.to_string();
                session.display_name = display_name.to_string();
                session.avatar = avatar.to_string();
                session.is_muted = is_muted;
            })
            .or_insert_with(|| Session {
                connection_id: connection_id.to_string(),
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                avatar: avatar.to_string(),
                is_muted,
                role: SessionRole::Joinee,
                status: SessionStatus::Waiting,
            });
    }

    /// Designate `connection_id` as host. First host wins: returns `true`
    /// only when no host was designated; a no-op returning `false` otherwise
    /// (including for an unknown connection).
    pub fn designate_host(&mut self, connection_id: &str) -> bool {
        if self.host.is_some() || !self.sessions.contains_key(connection_id) {
            return false;
        }
        if let Some(session) = self.sessions.get_mut(connection_id) {
            session.role = SessionRole::Host;
        }
        self.host = Some(connection_id.to_string());
        true
    }

    #[must_use]
    pub fn is_host_present(&self) -> bool {
        self.host.is_some()
    }

    /// Connection id currently holding the host slot, if any.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Remove a session, returning it for the caller's cleanup. Clears the
    /// host slot if the removed connection was host.
    pub fn remove_session(&mut self, connection_id: &str) -> Option<Session> {
        let session = self.sessions.remove(connection_id)?;
        if self.host.as_deref() == Some(connection_id) {
            self.host = None;
        }
        Some(session)
    }

    /// Update a session's mute flag. Unknown connection ids are a no-op.
    pub fn set_muted(&mut self, connection_id: &str, is_muted: bool) -> bool {
        match self.sessions.get_mut(connection_id) {
            Some(session) => {
                session.is_muted = is_muted;
                true
            }
            None => false,
        }
    }

    /// Transition a session's status.
    pub fn set_status(&mut self, connection_id: &str, status: SessionStatus) {
        if let Some(session) = self.sessions.get_mut(connection_id) {
            session.status = status;
        }
    }

    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    /// All sessions currently parked in `Waiting`.
    #[must_use]
    pub fn waiting_sessions(&self) -> Vec<Session> {
        self.sessions
            .values()
            .filter(|s| s.status == SessionStatus::Waiting)
            .cloned()
            .collect()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rand::Rng;

    fn register(registry: &mut RoomRegistry, conn: &str, user: &str) {
        registry.register_session(conn, user, user, "avatar.png", false);
    }

    #[test]
    fn test_register_is_idempotent_upsert() {
        let mut registry = RoomRegistry::new();
        register(&mut registry, "conn-1", "user-1");
        registry.designate_host("conn-1");

        // Re-register with a changed profile; role survives the upsert.
        registry.register_session("conn-1", "user-1", "New Name", "new.png", true);
        assert_eq!(registry.len(), 1);
        let session = registry.get("conn-1").unwrap();
        assert_eq!(session.display_name, "New Name");
        assert!(session.is_muted);
        assert_eq!(session.role, SessionRole::Host);
    }

    #[test]
    fn test_first_host_wins() {
        let mut registry = RoomRegistry::new();
        register(&mut registry, "conn-1", "user-1");
        register(&mut registry, "conn-2", "user-1");

        assert!(registry.designate_host("conn-1"));
        assert!(!registry.designate_host("conn-2"));
        assert_eq!(registry.host(), Some("conn-1"));
        assert_eq!(registry.get("conn-2").unwrap().role, SessionRole::Joinee);
    }

    #[test]
    fn test_designate_host_unknown_connection_is_noop() {
        let mut registry = RoomRegistry::new();
        assert!(!registry.designate_host("ghost"));
        assert!(!registry.is_host_present());
    }

    #[test]
    fn test_remove_session_clears_host_slot() {
        let mut registry = RoomRegistry::new();
        register(&mut registry, "conn-1", "user-1");
        register(&mut registry, "conn-2", "user-2");
        registry.designate_host("conn-1");

        let removed = registry.remove_session("conn-1").unwrap();
        assert_eq!(removed.role, SessionRole::Host);
        assert!(!registry.is_host_present());
        // Other sessions remain.
        assert!(registry.get("conn-2").is_some());

        // Slot cleared: a later owner join is an ordinary election.
        assert!(registry.designate_host("conn-2"));
    }

    #[test]
    fn test_remove_non_host_keeps_host_slot() {
        let mut registry = RoomRegistry::new();
        register(&mut registry, "conn-1", "user-1");
        register(&mut registry, "conn-2", "user-2");
        registry.designate_host("conn-1");

        registry.remove_session("conn-2");
        assert_eq!(registry.host(), Some("conn-1"));
    }

    #[test]
    fn test_remove_unknown_connection_returns_none() {
        let mut registry = RoomRegistry::new();
        assert!(registry.remove_session("ghost").is_none());
    }

    #[test]
    fn test_waiting_sessions() {
        let mut registry = RoomRegistry::new();
        register(&mut registry, "conn-1", "user-1");
        register(&mut registry, "conn-2", "user-2");
        registry.set_status("conn-1", SessionStatus::Active);

        let waiting = registry.waiting_sessions();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].connection_id, "conn-2");
    }

    /// Invariant: at most one host at any instant, over randomized
    /// join/designate/disconnect sequences.
    #[test]
    fn test_host_uniqueness_under_random_sequences() {
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let mut registry = RoomRegistry::new();
            for _ in 0..64 {
                let conn = format!("conn-{}", rng.gen_range(0..8));
                match rng.gen_range(0..3) {
                    0 => register(&mut registry, &conn, &format!("user-{conn}")),
                    1 => {
                        registry.designate_host(&conn);
                    }
                    _ => {
                        registry.remove_session(&conn);
                    }
                }

                let hosts = registry
                    .sessions()
                    .filter(|s| s.role == SessionRole::Host)
                    .count();
                assert!(hosts <= 1, "more than one host-designated session");
                if let Some(host) = registry.host() {
                    assert!(
                        registry.get(host).is_some(),
                        "host slot points at a removed session"
                    );
                } else {
                    // No dangling host roles once the slot is clear: roles are
                    // rewritten on the next election, so only assert the slot.
                }
            }
        }
    }
}
