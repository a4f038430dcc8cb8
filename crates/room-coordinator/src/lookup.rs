//! Room lookup collaborator.
//!
//! Resolving a room identifier to its owning user is done by a sibling
//! service; this layer only consumes the answer. The trait keeps the
//! coordinator decoupled from whatever API the platform exposes — deployments
//! implement [`RoomLookup`] against the room directory, while
//! [`StaticRoomDirectory`] serves development and tests.

use crate::errors::CoordinatorError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Resolves a room's owning user.
#[async_trait]
pub trait RoomLookup: Send + Sync {
    /// Returns the owning user id, or `None` if the room does not exist.
    async fn resolve_room_owner(&self, room_id: &str)
        -> Result<Option<String>, CoordinatorError>;
}

/// In-memory room directory seeded from config or tests.
#[derive(Debug, Default)]
pub struct StaticRoomDirectory {
    rooms: RwLock<HashMap<String, String>>,
}

impl StaticRoomDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from `(room_id, owner_user_id)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            rooms: RwLock::new(pairs.into_iter().collect()),
        }
    }

    /// Register or replace a room's owner.
    pub async fn insert_room(&self, room_id: &str, owner_user_id: &str) {
        self.rooms
            .write()
            .await
            .insert(room_id.to_string(), owner_user_id.to_string());
    }

    /// Remove a room from the directory.
    pub async fn remove_room(&self, room_id: &str) {
        self.rooms.write().await.remove(room_id);
    }
}

#[async_trait]
impl RoomLookup for StaticRoomDirectory {
    async fn resolve_room_owner(
        &self,
        room_id: &str,
    ) -> Result<Option<String>, CoordinatorError> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }
}
