//! Connections
//!
//! A connection is one participant's socket. The hub holds its
//! [`ConnectionHandle`] (the only strong sender of the outbound queue), the
//! pumps hold the receiving end and a weak sender. Dropping the handle is
//! what closes the queue.

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::hub::HubHandle;
use super::messages::ClientFrame;
use super::pump::{InboundPump, OutboundPump};
use crate::config::ConnectionConfig;
use crate::ot::DocumentSnapshot;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Externally supplied room key
pub type RoomKey = String;

const MAX_USERNAME_CHARS: usize = 32;

/// Items queued for a connection's outbound pump
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Room state at the moment the hub admitted the connection; always
    /// the first item the hub queues
    Snapshot(DocumentSnapshot),
    /// Edit from another participant; applied to the shadow, then the full
    /// shadow content is sent
    Remote(Arc<ClientFrame>),
    /// The connection's own edit; applied to the shadow, nothing is sent
    Local(ClientFrame),
    /// Pre-encoded roster message, sent as-is
    Roster(Arc<str>),
}

/// Hub-side view of a connection
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub room: RoomKey,
    pub username: String,
    pub sender: mpsc::Sender<Outbound>,
}

/// A freshly upgraded connection, before its pumps are started
pub struct Connection {
    id: ConnectionId,
    room: RoomKey,
    username: String,
    sender: mpsc::Sender<Outbound>,
    receiver: mpsc::Receiver<Outbound>,
}

impl Connection {
    /// Create a connection. Its shadow is seeded by the hub on register.
    ///
    /// A blank or missing name becomes `Guest-xxxx`.
    pub fn new(room: impl Into<RoomKey>, name: Option<&str>, queue_capacity: usize) -> Self {
        let id = Uuid::new_v4().to_string();
        let username = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.chars().take(MAX_USERNAME_CHARS).collect(),
            None => format!("Guest-{}", &id[..4]),
        };
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));

        Self {
            id,
            room: room.into(),
            username,
            sender,
            receiver,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Split into the hub handle and the two pumps.
    ///
    /// The inbound pump only gets a weak sender so that the queue closes as
    /// soon as the hub drops the handle.
    pub fn into_parts(
        self,
        hub: HubHandle,
        config: &ConnectionConfig,
    ) -> (ConnectionHandle, InboundPump, OutboundPump) {
        let inbound = InboundPump::new(
            self.id.clone(),
            self.room.clone(),
            hub,
            self.sender.downgrade(),
            config,
        );
        let outbound = OutboundPump::new(self.id.clone(), self.receiver, config);
        let handle = ConnectionHandle {
            id: self.id,
            room: self.room,
            username: self.username,
            sender: self.sender,
        };

        (handle, inbound, outbound)
    }
}
