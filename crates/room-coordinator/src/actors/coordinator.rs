//! Coordinator actor.
//!
//! The root of the actor hierarchy. Resolves room ids through the
//! [`RoomLookup`] collaborator, lazily spawns one room actor per live room,
//! and removes rooms when their last session leaves. It never awaits relay
//! allocation itself — callers get the room handle back and drive the join
//! directly, so one slow allocation cannot stall every other room.

use crate::actors::messages::{CoordinatorMessage, CoordinatorStatus};
use crate::actors::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::actors::room::{RoomActor, RoomActorHandle};
use crate::errors::CoordinatorError;
use crate::lookup::RoomLookup;
use crate::media::MediaTransportManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COORDINATOR_MAILBOX_SIZE: usize = 1024;

/// Handle to the coordinator actor.
#[derive(Debug, Clone)]
pub struct CoordinatorActorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
}

impl CoordinatorActorHandle {
    /// Spawn the coordinator actor. The returned `JoinHandle` resolves when
    /// the actor's loop exits.
    pub fn spawn(
        lookup: Arc<dyn RoomLookup>,
        media: Arc<MediaTransportManager>,
        metrics: Arc<ActorMetrics>,
        parent_token: &CancellationToken,
        max_rooms: usize,
        allocation_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COORDINATOR_MAILBOX_SIZE);
        let cancel_token = parent_token.child_token();

        let actor = CoordinatorActor {
            lookup,
            media,
            metrics: Arc::clone(&metrics),
            rooms: HashMap::new(),
            coordinator_sender: sender.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            mailbox: MailboxMonitor::new(ActorType::Coordinator, "coordinator"),
            max_rooms,
            allocation_timeout,
            draining: false,
        };

        let task = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
                metrics,
            },
            task,
        )
    }

    /// Resolve `room_id` to its room actor, spawning one if needed.
    pub async fn resolve_room(&self, room_id: &str) -> Result<RoomActorHandle, CoordinatorError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::ResolveRoom {
                room_id: room_id.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| CoordinatorError::Draining)?;
        response.await.map_err(|_| CoordinatorError::Draining)?
    }

    /// Coordinator-level counts for the status endpoint.
    pub async fn get_status(&self) -> Result<CoordinatorStatus, CoordinatorError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::GetStatus { respond_to })
            .await
            .map_err(|_| CoordinatorError::Draining)?;
        response.await.map_err(|_| CoordinatorError::Draining)
    }

    /// Begin graceful shutdown: the cancellation tree stops every room and
    /// connection actor under the coordinator.
    pub fn shutdown(&self) {
        info!(target: "rc.actor.coordinator", "Coordinator shutdown requested");
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }
}

struct ManagedRoom {
    handle: RoomActorHandle,
    task: JoinHandle<()>,
}

struct CoordinatorActor {
    lookup: Arc<dyn RoomLookup>,
    media: Arc<MediaTransportManager>,
    metrics: Arc<ActorMetrics>,
    rooms: HashMap<String, ManagedRoom>,
    coordinator_sender: mpsc::Sender<CoordinatorMessage>,
    receiver: mpsc::Receiver<CoordinatorMessage>,
    cancel_token: CancellationToken,
    mailbox: MailboxMonitor,
    max_rooms: usize,
    allocation_timeout: Duration,
    draining: bool,
}

impl CoordinatorActor {
    async fn run(mut self) {
        info!(target: "rc.actor.coordinator", "Coordinator actor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled(), if !self.draining => {
                    self.draining = true;
                    info!(
                        target: "rc.actor.coordinator",
                        active_rooms = self.rooms.len(),
                        "Draining: cancelling room actors"
                    );
                    for room in self.rooms.values() {
                        room.handle.cancel();
                    }
                    break;
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                        }
                        None => break,
                    }
                }
            }
        }

        // Wait for room actors to finish their teardown.
        for (room_id, room) in self.rooms.drain() {
            if let Err(err) = room.task.await {
                if err.is_panic() {
                    self.metrics.record_panic(ActorType::Room);
                }
                warn!(
                    target: "rc.actor.coordinator",
                    room_id = %room_id,
                    error = %err,
                    "Room actor task ended abnormally"
                );
            }
            self.metrics.room_removed();
        }

        info!(target: "rc.actor.coordinator", "Coordinator actor stopped");
    }

    async fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::ResolveRoom {
                room_id,
                respond_to,
            } => {
                let result = self.resolve_room(&room_id).await;
                let _ = respond_to.send(result);
            }
            CoordinatorMessage::RoomEmpty { room_id } => {
                if let Some(room) = self.rooms.remove(&room_id) {
                    room.handle.cancel();
                    if let Err(err) = room.task.await {
                        if err.is_panic() {
                            self.metrics.record_panic(ActorType::Room);
                        }
                        warn!(
                            target: "rc.actor.coordinator",
                            room_id = %room_id,
                            error = %err,
                            "Room actor task ended abnormally"
                        );
                    }
                    self.metrics.room_removed();
                    debug!(
                        target: "rc.actor.coordinator",
                        room_id = %room_id,
                        active_rooms = self.rooms.len(),
                        "Empty room removed"
                    );
                }
            }
            CoordinatorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(CoordinatorStatus {
                    room_count: self.rooms.len(),
                    connection_count: self.metrics.connection_count(),
                    is_draining: self.draining,
                });
            }
        }
    }

    async fn resolve_room(&mut self, room_id: &str) -> Result<RoomActorHandle, CoordinatorError> {
        if self.draining {
            return Err(CoordinatorError::Draining);
        }
        if let Some(room) = self.rooms.get(room_id) {
            return Ok(room.handle.clone());
        }
        if self.rooms.len() >= self.max_rooms {
            return Err(CoordinatorError::Internal(format!(
                "room capacity reached ({})",
                self.max_rooms
            )));
        }

        let owner_user_id = self
            .lookup
            .resolve_room_owner(room_id)
            .await?
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))?;

        let (handle, task) = RoomActor::spawn(
            room_id.to_string(),
            owner_user_id,
            Arc::clone(&self.media),
            self.coordinator_sender.clone(),
            &self.cancel_token,
            self.allocation_timeout,
        );

        self.rooms.insert(
            room_id.to_string(),
            ManagedRoom {
                handle: handle.clone(),
                task,
            },
        );
        self.metrics.room_created();

        info!(
            target: "rc.actor.coordinator",
            room_id = %room_id,
            active_rooms = self.rooms.len(),
            "Room actor spawned"
        );

        Ok(handle)
    }
}
