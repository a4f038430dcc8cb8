//! Room actor.
//!
//! One per live room. Owns the room's [`RoomRegistry`] and the map of
//! connection handles, so every membership mutation and fan-out for the room
//! runs on this actor's single loop — operations on the same `(room, user)`
//! are serialized by construction, with no cross-room contention.
//!
//! The join state machine:
//! - the room owner's first connection is designated host and goes `ACTIVE`;
//! - anyone joining while a host is present goes `ACTIVE`;
//! - anyone joining before the host is parked `WAITING` with no media, and is
//!   promoted (status flip + transport provisioning) when the host arrives.
//!
//! Media transports are provisioned only for `ACTIVE` sessions.

use crate::actors::connection::ConnectionActorHandle;
use crate::actors::messages::{
    CoordinatorMessage, JoinOutcome, JoinProfile, RoomMessage, RoomStateSnapshot,
};
use crate::actors::metrics::{ActorType, MailboxMonitor};
use crate::errors::CoordinatorError;
use crate::events::{AckPayload, ServerEvent};
use crate::media::MediaTransportManager;
use crate::registry::{RoomRegistry, Session, SessionRole, SessionStatus};
use relay_core::{DtlsParameters, MediaKind, TransportDirection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ROOM_MAILBOX_SIZE: usize = 1024;

/// Handle to a room actor.
#[derive(Debug, Clone)]
pub struct RoomActorHandle {
    room_id: String,
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
}

impl RoomActorHandle {
    /// Run the join state machine for a connection.
    pub async fn join(
        &self,
        profile: JoinProfile,
        connection: ConnectionActorHandle,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RoomMessage::Join {
                profile,
                connection,
                respond_to,
            })
            .await
            .map_err(|_| CoordinatorError::Internal("room actor unavailable".to_string()))?;
        response
            .await
            .map_err(|_| CoordinatorError::Internal("room actor dropped join".to_string()))?
    }

    pub async fn chat(&self, connection_id: String, claimed_user_id: String, content: String) {
        let _ = self
            .sender
            .send(RoomMessage::Chat {
                connection_id,
                claimed_user_id,
                content,
            })
            .await;
    }

    pub async fn toggle_mute(
        &self,
        connection_id: String,
        claimed_user_id: String,
        is_muted: bool,
    ) {
        let _ = self
            .sender
            .send(RoomMessage::ToggleMute {
                connection_id,
                claimed_user_id,
                is_muted,
            })
            .await;
    }

    pub async fn connect_transport(
        &self,
        connection_id: String,
        request_id: String,
        direction: TransportDirection,
        dtls_parameters: DtlsParameters,
    ) {
        let _ = self
            .sender
            .send(RoomMessage::ConnectTransport {
                connection_id,
                request_id,
                direction,
                dtls_parameters,
            })
            .await;
    }

    pub async fn produce(
        &self,
        connection_id: String,
        request_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) {
        let _ = self
            .sender
            .send(RoomMessage::Produce {
                connection_id,
                request_id,
                kind,
                rtp_parameters,
            })
            .await;
    }

    pub async fn consume(
        &self,
        connection_id: String,
        request_id: String,
        producer_id: String,
        rtp_capabilities: serde_json::Value,
    ) {
        let _ = self
            .sender
            .send(RoomMessage::Consume {
                connection_id,
                request_id,
                producer_id,
                rtp_capabilities,
            })
            .await;
    }

    pub async fn disconnect(&self, connection_id: String) {
        let _ = self
            .sender
            .send(RoomMessage::Disconnect { connection_id })
            .await;
    }

    pub async fn get_state(&self) -> Option<RoomStateSnapshot> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to })
            .await
            .ok()?;
        response.await.ok()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

/// Actor owning one room's membership and fan-out.
pub struct RoomActor {
    room_id: String,
    owner_user_id: String,
    registry: RoomRegistry,
    connections: HashMap<String, ConnectionActorHandle>,
    media: Arc<MediaTransportManager>,
    coordinator: mpsc::Sender<CoordinatorMessage>,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    mailbox: MailboxMonitor,
    allocation_timeout: Duration,
}

impl RoomActor {
    /// Spawn a room actor for `room_id` owned by `owner_user_id`.
    pub fn spawn(
        room_id: String,
        owner_user_id: String,
        media: Arc<MediaTransportManager>,
        coordinator: mpsc::Sender<CoordinatorMessage>,
        parent_token: &CancellationToken,
        allocation_timeout: Duration,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_MAILBOX_SIZE);
        let cancel_token = parent_token.child_token();
        let mailbox = MailboxMonitor::new(ActorType::Room, room_id.clone());

        let actor = RoomActor {
            room_id: room_id.clone(),
            owner_user_id,
            registry: RoomRegistry::new(),
            connections: HashMap::new(),
            media,
            coordinator,
            receiver,
            cancel_token: cancel_token.clone(),
            mailbox,
            allocation_timeout,
        };

        let task = tokio::spawn(actor.run());

        (
            RoomActorHandle {
                room_id,
                sender,
                cancel_token,
            },
            task,
        )
    }

    async fn run(mut self) {
        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            owner_user_id = %self.owner_user_id,
            "Room actor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rc.actor.room",
                        room_id = %self.room_id,
                        "Room actor cancelled"
                    );
                    break;
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let stop = self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            if stop {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        // Release any relay resources still keyed under this room.
        self.media.cleanup_room(&self.room_id).await;

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            "Room actor stopped"
        );
    }

    /// Returns `true` when the actor should stop (registry drained).
    async fn handle_message(&mut self, message: RoomMessage) -> bool {
        match message {
            RoomMessage::Join {
                profile,
                connection,
                respond_to,
            } => {
                let outcome = self.handle_join(profile, connection).await;
                let _ = respond_to.send(outcome);
                self.stop_if_empty().await
            }
            RoomMessage::Chat {
                connection_id,
                claimed_user_id,
                content,
            } => {
                self.handle_chat(&connection_id, &claimed_user_id, content);
                false
            }
            RoomMessage::ToggleMute {
                connection_id,
                claimed_user_id,
                is_muted,
            } => {
                self.handle_toggle_mute(&connection_id, &claimed_user_id, is_muted);
                false
            }
            RoomMessage::ConnectTransport {
                connection_id,
                request_id,
                direction,
                dtls_parameters,
            } => {
                self.handle_connect_transport(&connection_id, &request_id, direction, dtls_parameters)
                    .await;
                false
            }
            RoomMessage::Produce {
                connection_id,
                request_id,
                kind,
                rtp_parameters,
            } => {
                self.handle_produce(&connection_id, &request_id, kind, rtp_parameters)
                    .await;
                false
            }
            RoomMessage::Consume {
                connection_id,
                request_id,
                producer_id,
                rtp_capabilities,
            } => {
                self.handle_consume(&connection_id, &request_id, &producer_id, rtp_capabilities)
                    .await;
                false
            }
            RoomMessage::Disconnect { connection_id } => {
                self.handle_disconnect(&connection_id).await;
                self.stop_if_empty().await
            }
            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(RoomStateSnapshot {
                    room_id: self.room_id.clone(),
                    session_count: self.registry.len(),
                    host_present: self.registry.is_host_present(),
                    waiting_count: self.registry.waiting_sessions().len(),
                });
                false
            }
        }
    }

    async fn handle_join(
        &mut self,
        profile: JoinProfile,
        connection: ConnectionActorHandle,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let connection_id = profile.connection_id.clone();
        self.registry.register_session(
            &connection_id,
            &profile.user_id,
            &profile.username,
            &profile.avatar,
            profile.is_muted,
        );
        self.connections.insert(connection_id.clone(), connection);

        let is_host = profile.user_id == self.owner_user_id
            && (self.registry.host() == Some(connection_id.as_str())
                || self.registry.designate_host(&connection_id));

        let outcome = if is_host {
            self.join_as_host(&profile).await
        } else if self.registry.is_host_present() {
            self.join_as_active_participant(&profile).await
        } else {
            self.join_as_waiting_participant(&profile)
        };

        // Provisioning failures are scoped to the requester: the session
        // stays registered (parked) so the client can retry the join over
        // the same connection.
        if let Err(err) = &outcome {
            warn!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                user_id = %profile.user_id,
                error = %err,
                "Join failed, session parked for retry"
            );
            self.registry.set_status(&connection_id, SessionStatus::Waiting);
        }

        outcome
    }

    async fn join_as_host(
        &mut self,
        profile: &JoinProfile,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let connection_id = &profile.connection_id;
        self.registry.set_status(connection_id, SessionStatus::Active);

        self.deliver(
            connection_id,
            ServerEvent::SetCurrentUser {
                user_id: profile.user_id.clone(),
                username: profile.username.clone(),
                avatar: profile.avatar.clone(),
                role: SessionRole::Host,
            },
        );
        self.deliver(connection_id, ServerEvent::HostStatus);
        self.provision_media(connection_id, &profile.user_id).await?;
        self.deliver(
            connection_id,
            ServerEvent::SetStatus {
                status: SessionStatus::Active,
            },
        );

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            user_id = %profile.user_id,
            "Host joined"
        );

        self.broadcast_except(connection_id, &ServerEvent::HostJoined);

        self.promote_waiting_sessions().await;

        Ok(JoinOutcome {
            role: SessionRole::Host,
            status: SessionStatus::Active,
        })
    }

    async fn join_as_active_participant(
        &mut self,
        profile: &JoinProfile,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let connection_id = &profile.connection_id;
        self.registry.set_status(connection_id, SessionStatus::Active);

        self.deliver(
            connection_id,
            ServerEvent::SetCurrentUser {
                user_id: profile.user_id.clone(),
                username: profile.username.clone(),
                avatar: profile.avatar.clone(),
                role: SessionRole::Joinee,
            },
        );
        self.deliver(connection_id, ServerEvent::RoomStatus { host_present: true });
        self.provision_media(connection_id, &profile.user_id).await?;
        self.deliver(
            connection_id,
            ServerEvent::SetStatus {
                status: SessionStatus::Active,
            },
        );

        self.broadcast_except(
            connection_id,
            &ServerEvent::UserConnected {
                user_id: profile.user_id.clone(),
                username: profile.username.clone(),
                avatar: profile.avatar.clone(),
                is_muted: profile.is_muted,
            },
        );

        Ok(JoinOutcome {
            role: SessionRole::Joinee,
            status: SessionStatus::Active,
        })
    }

    fn join_as_waiting_participant(
        &mut self,
        profile: &JoinProfile,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let connection_id = &profile.connection_id;
        self.registry.set_status(connection_id, SessionStatus::Waiting);

        self.deliver(
            connection_id,
            ServerEvent::SetCurrentUser {
                user_id: profile.user_id.clone(),
                username: profile.username.clone(),
                avatar: profile.avatar.clone(),
                role: SessionRole::Joinee,
            },
        );
        self.deliver(connection_id, ServerEvent::WaitingForHost);
        self.deliver(
            connection_id,
            ServerEvent::SetStatus {
                status: SessionStatus::Waiting,
            },
        );

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            user_id = %profile.user_id,
            "Participant parked waiting for host"
        );

        Ok(JoinOutcome {
            role: SessionRole::Joinee,
            status: SessionStatus::Waiting,
        })
    }

    /// Flip every `WAITING` session to `ACTIVE` and provision its media.
    /// Runs when the host arrives.
    async fn promote_waiting_sessions(&mut self) {
        for session in self.registry.waiting_sessions() {
            let connection_id = session.connection_id.clone();
            self.registry.set_status(&connection_id, SessionStatus::Active);

            if let Err(err) = self.provision_media(&connection_id, &session.user_id).await {
                warn!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    connection_id = %connection_id,
                    user_id = %session.user_id,
                    error = %err,
                    "Failed to provision media for promoted session"
                );
                self.deliver_error(&connection_id, &err);
                self.registry.set_status(&connection_id, SessionStatus::Waiting);
                continue;
            }

            self.deliver(
                &connection_id,
                ServerEvent::SetStatus {
                    status: SessionStatus::Active,
                },
            );

            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                user_id = %session.user_id,
                "Waiting session promoted"
            );
        }
    }

    /// Allocate a transport pair (bounded by the allocation timeout) and send
    /// the descriptors plus existing-producer notices to the connection.
    /// No-op if the pair already exists.
    async fn provision_media(
        &mut self,
        connection_id: &str,
        user_id: &str,
    ) -> Result<(), CoordinatorError> {
        if self.media.transport_count(&self.room_id, user_id) == 2 {
            return Ok(());
        }

        let pair = tokio::time::timeout(
            self.allocation_timeout,
            self.media.create_transport_pair(&self.room_id, user_id),
        )
        .await
        .map_err(|_| {
            CoordinatorError::TransportAllocation(format!(
                "allocation timed out after {:?}",
                self.allocation_timeout
            ))
        })??;

        self.deliver(
            connection_id,
            ServerEvent::SfuTransports {
                send_transport: pair.send,
                recv_transport: pair.recv,
            },
        );

        // Catch the newcomer up on media already flowing in the room.
        for (producer_id, producer_user, _kind) in self.media.room_producers(&self.room_id) {
            if producer_user != user_id {
                self.deliver(
                    connection_id,
                    ServerEvent::NewProducer {
                        producer_id,
                        user_id: producer_user,
                    },
                );
            }
        }

        Ok(())
    }

    fn handle_chat(&mut self, connection_id: &str, claimed_user_id: &str, content: String) {
        let Some(session) = self.verified_session(connection_id, claimed_user_id, "chat") else {
            return;
        };

        let event = ServerEvent::ChatMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            user_id: session.user_id,
            username: session.display_name,
            avatar: session.avatar,
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        // Chat echoes back to the sender as well.
        self.broadcast(&event);
    }

    fn handle_toggle_mute(&mut self, connection_id: &str, claimed_user_id: &str, is_muted: bool) {
        let Some(session) = self.verified_session(connection_id, claimed_user_id, "toggle-mute")
        else {
            return;
        };

        self.registry.set_muted(connection_id, is_muted);
        self.broadcast(&ServerEvent::MuteStatus {
            user_id: session.user_id,
            is_muted,
        });
    }

    async fn handle_connect_transport(
        &mut self,
        connection_id: &str,
        request_id: &str,
        direction: TransportDirection,
        dtls_parameters: DtlsParameters,
    ) {
        let Some(user_id) = self.session_user(connection_id) else {
            return;
        };

        match self
            .media
            .connect_transport(&self.room_id, &user_id, direction, dtls_parameters)
            .await
        {
            Ok(()) => self.deliver(
                connection_id,
                ServerEvent::Ack {
                    request_id: request_id.to_string(),
                    payload: AckPayload::TransportConnected,
                },
            ),
            Err(err) => self.deliver_error(connection_id, &err),
        }
    }

    async fn handle_produce(
        &mut self,
        connection_id: &str,
        request_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) {
        let Some(user_id) = self.session_user(connection_id) else {
            return;
        };

        match self
            .media
            .produce(&self.room_id, &user_id, kind, rtp_parameters)
            .await
        {
            Ok(producer_id) => {
                self.deliver(
                    connection_id,
                    ServerEvent::Ack {
                        request_id: request_id.to_string(),
                        payload: AckPayload::ProducerCreated {
                            producer_id: producer_id.clone(),
                        },
                    },
                );
                self.broadcast_except(
                    connection_id,
                    &ServerEvent::NewProducer {
                        producer_id,
                        user_id,
                    },
                );
            }
            Err(err) => self.deliver_error(connection_id, &err),
        }
    }

    async fn handle_consume(
        &mut self,
        connection_id: &str,
        request_id: &str,
        producer_id: &str,
        rtp_capabilities: serde_json::Value,
    ) {
        let Some(user_id) = self.session_user(connection_id) else {
            return;
        };

        match self
            .media
            .consume(&self.room_id, &user_id, producer_id, rtp_capabilities)
            .await
        {
            Ok(consumer) => self.deliver(
                connection_id,
                ServerEvent::Ack {
                    request_id: request_id.to_string(),
                    payload: AckPayload::ConsumerCreated { consumer },
                },
            ),
            Err(err) => self.deliver_error(connection_id, &err),
        }
    }

    async fn handle_disconnect(&mut self, connection_id: &str) {
        self.connections.remove(connection_id);
        let Some(session) = self.registry.remove_session(connection_id) else {
            return;
        };

        self.media.cleanup_user(&self.room_id, &session.user_id).await;
        self.broadcast(&ServerEvent::UserDisconnected {
            user_id: session.user_id.clone(),
        });

        if session.role == SessionRole::Host {
            info!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                user_id = %session.user_id,
                "Host left, tearing down room media"
            );
            self.media.cleanup_room(&self.room_id).await;
            self.broadcast(&ServerEvent::HostLeft);

            // Remaining sessions stay registered but go media-less until the
            // host returns; the next host join re-promotes them.
            let remaining: Vec<String> = self
                .registry
                .sessions()
                .map(|s| s.connection_id.clone())
                .collect();
            for connection_id in remaining {
                self.registry.set_status(&connection_id, SessionStatus::Waiting);
                self.deliver(
                    &connection_id,
                    ServerEvent::SetStatus {
                        status: SessionStatus::Waiting,
                    },
                );
            }
        } else {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                user_id = %session.user_id,
                "Participant disconnected"
            );
        }
    }

    /// Notify the coordinator and stop once the last session is gone.
    async fn stop_if_empty(&mut self) -> bool {
        if !self.registry.is_empty() {
            return false;
        }
        let _ = self
            .coordinator
            .send(CoordinatorMessage::RoomEmpty {
                room_id: self.room_id.clone(),
            })
            .await;
        true
    }

    /// Look up the sender's session and check its claimed identity. Identity
    /// mismatches are dropped without fan-out.
    fn verified_session(
        &self,
        connection_id: &str,
        claimed_user_id: &str,
        action: &str,
    ) -> Option<Session> {
        let session = self.registry.get(connection_id)?;
        if session.user_id != claimed_user_id {
            warn!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                claimed_user_id = %claimed_user_id,
                session_user_id = %session.user_id,
                action,
                "Dropping event with mismatched identity"
            );
            return None;
        }
        Some(session.clone())
    }

    fn session_user(&self, connection_id: &str) -> Option<String> {
        self.registry
            .get(connection_id)
            .map(|session| session.user_id.clone())
    }

    fn deliver(&self, connection_id: &str, event: ServerEvent) {
        if let Some(connection) = self.connections.get(connection_id) {
            connection.deliver(event);
        }
    }

    fn deliver_error(&self, connection_id: &str, err: &CoordinatorError) {
        self.deliver(
            connection_id,
            ServerEvent::Error {
                code: err.error_code(),
                message: err.client_message(),
            },
        );
    }

    fn broadcast(&self, event: &ServerEvent) {
        for connection in self.connections.values() {
            connection.deliver(event.clone());
        }
    }

    fn broadcast_except(&self, except_connection_id: &str, event: &ServerEvent) {
        for (connection_id, connection) in &self.connections {
            if connection_id != except_connection_id {
                connection.deliver(event.clone());
            }
        }
    }
}
