//! Connection actor.
//!
//! One per live WebSocket. Owns serialization of outbound server events: the
//! room actor hands it typed [`ServerEvent`]s and it pushes JSON text frames
//! into the socket writer's channel. A slow or dead client therefore degrades
//! only its own delivery, never the room loop.

use crate::actors::messages::ConnectionMessage;
use crate::actors::metrics::{ActorType, MailboxMonitor};
use crate::events::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const CONNECTION_MAILBOX_SIZE: usize = 256;

/// Handle to a connection actor.
#[derive(Debug, Clone)]
pub struct ConnectionActorHandle {
    connection_id: String,
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
}

impl ConnectionActorHandle {
    /// Queue a server event for delivery. Returns `false` if the actor is
    /// gone or its mailbox is full — callers treat that as a dead connection.
    pub fn deliver(&self, event: ServerEvent) -> bool {
        match self.sender.try_send(ConnectionMessage::Deliver(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    target: "rc.actor.connection",
                    connection_id = %self.connection_id,
                    "Connection mailbox full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the actor to stop. Delivery after this is best-effort.
    pub async fn close(&self, reason: &'static str) {
        let _ = self.sender.send(ConnectionMessage::Close { reason }).await;
    }

    /// Cancel the actor without draining its mailbox.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }
}

/// Actor that owns one socket's outbound event stream.
pub struct ConnectionActor {
    connection_id: String,
    receiver: mpsc::Receiver<ConnectionMessage>,
    outbound: mpsc::Sender<String>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActor {
    /// Spawn a connection actor feeding JSON frames into `outbound`.
    ///
    /// `parent_token` is the server's shutdown token; the actor gets a child
    /// so server shutdown cancels every connection.
    pub fn spawn(
        connection_id: String,
        outbound: mpsc::Sender<String>,
        parent_token: &CancellationToken,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_MAILBOX_SIZE);
        let cancel_token = parent_token.child_token();
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            connection_id.clone(),
        ));

        let actor = ConnectionActor {
            connection_id: connection_id.clone(),
            receiver,
            outbound,
            cancel_token: cancel_token.clone(),
            mailbox,
        };

        let task = tokio::spawn(actor.run());

        (
            ConnectionActorHandle {
                connection_id,
                sender,
                cancel_token,
            },
            task,
        )
    }

    async fn run(mut self) {
        debug!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            "Connection actor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rc.actor.connection",
                        connection_id = %self.connection_id,
                        "Connection actor cancelled"
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

        debug!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            "Connection actor stopped"
        );
    }

    /// Returns `true` when the actor should stop.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Deliver(event) => {
                match serde_json::to_string(&event) {
                    Ok(frame) => {
                        trace!(
                            target: "rc.actor.connection",
                            connection_id = %self.connection_id,
                            bytes = frame.len(),
                            "Delivering event"
                        );
                        if self.outbound.send(frame).await.is_err() {
                            // Writer task is gone; the socket closed under us.
                            return true;
                        }
                    }
                    Err(err) => {
                        warn!(
                            target: "rc.actor.connection",
                            connection_id = %self.connection_id,
                            error = %err,
                            "Failed to serialize server event"
                        );
                    }
                }
                false
            }
            ConnectionMessage::Close { reason } => {
                debug!(
                    target: "rc.actor.connection",
                    connection_id = %self.connection_id,
                    reason,
                    "Connection actor closing"
                );
                true
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::ServerEvent;
    use std::time::Duration;

    #[tokio::test]
    async fn test_deliver_serializes_to_outbound() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let (handle, _task) = ConnectionActor::spawn("conn-1".to_string(), outbound_tx, &token);

        assert!(handle.deliver(ServerEvent::HostJoined));

        let frame = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "host-joined");
    }

    #[tokio::test]
    async fn test_close_stops_actor() {
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let (handle, task) = ConnectionActor::spawn("conn-1".to_string(), outbound_tx, &token);

        handle.close("test").await;
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!handle.deliver(ServerEvent::HostJoined));
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_actor() {
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let (_handle, task) = ConnectionActor::spawn("conn-1".to_string(), outbound_tx, &token);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
