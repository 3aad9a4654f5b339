//! WebSocket Hub
//!
//! The hub is a single actor task. It alone creates and deletes rooms,
//! changes room membership, applies edits to room documents and fans the
//! results out. Everything else talks to it through [`HubHandle`], which
//! sends [`HubCommand`]s over a bounded channel.
//!
//! Snapshot reads are the one exception: the hub publishes each room's
//! [`Document`] in a [`RoomDirectory`] so request handlers can read content
//! without a round trip through the actor.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::connection::{ConnectionHandle, ConnectionId, Outbound, RoomKey};
use super::messages::{ClientFrame, ServerMessage};
use crate::config::HubConfig;
use crate::ot::{Document, DocumentSnapshot};
use crate::presence::{PresenceRegistry, User};

/// A decoded frame on its way to the hub
#[derive(Debug, Clone)]
pub struct Envelope {
    pub room: RoomKey,
    pub origin: ConnectionId,
    pub frame: ClientFrame,
}

/// Messages processed by the hub, one at a time
#[derive(Debug)]
pub enum HubCommand {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Dispatch(Envelope),
    Stats(oneshot::Sender<HubStats>),
    RoomUsers {
        room: RoomKey,
        reply: oneshot::Sender<Vec<User>>,
    },
}

/// Counts reported by the hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub rooms: usize,
    pub connections: usize,
}

/// Room key → document, written only by the hub
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    documents: Arc<RwLock<HashMap<RoomKey, Arc<Document>>>>,
}

impl RoomDirectory {
    pub fn get(&self, room: &str) -> Option<Arc<Document>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room)
            .cloned()
    }

    pub fn contains(&self, room: &str) -> bool {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(room)
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, room: RoomKey, document: Arc<Document>) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(room, document);
    }

    fn remove(&self, room: &str) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(room);
    }
}

struct Room {
    document: Arc<Document>,
    members: HashMap<ConnectionId, ConnectionHandle>,
}

/// The hub actor's state
pub struct Hub {
    rooms: HashMap<RoomKey, Room>,
    /// Which room each registered connection is in
    locations: HashMap<ConnectionId, RoomKey>,
    presence: PresenceRegistry,
    directory: RoomDirectory,
}

impl Hub {
    pub fn new(directory: RoomDirectory) -> Self {
        Self::with_presence(directory, PresenceRegistry::new())
    }

    pub fn with_presence(directory: RoomDirectory, presence: PresenceRegistry) -> Self {
        Self {
            rooms: HashMap::new(),
            locations: HashMap::new(),
            presence,
            directory,
        }
    }

    /// Start the hub on its own task and return a handle to it.
    ///
    /// The task ends once every handle has been dropped.
    pub fn spawn(config: &HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let directory = RoomDirectory::default();
        let hub = Hub::new(directory.clone());
        let task = tokio::spawn(hub.run(receiver));

        (HubHandle::new(commands, directory), task)
    }

    /// Process commands until the channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        tracing::info!("Hub started");
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        tracing::info!(rooms = self.rooms.len(), "Hub stopped");
    }

    /// Process a single command. Never blocks.
    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(connection) => self.register(connection),
            HubCommand::Unregister(id) => self.unregister(&id),
            HubCommand::Dispatch(envelope) => self.dispatch(envelope),
            HubCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            HubCommand::RoomUsers { room, reply } => {
                let _ = reply.send(self.presence.room_users(&room));
            }
        }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.rooms.len(),
            connections: self.locations.len(),
        }
    }

    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|r| r.members.len()).unwrap_or(0)
    }

    pub fn is_member(&self, room: &str, id: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|r| r.members.contains_key(id))
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    fn register(&mut self, connection: ConnectionHandle) {
        let room_key = connection.room.clone();
        let id = connection.id.clone();

        // A connection lives in exactly one room
        if self.locations.contains_key(&id) {
            self.unregister(&id);
        }

        // Taken inside the actor: every later fan-out to this connection
        // applies on top of exactly this state
        let snapshot = self
            .rooms
            .get(&room_key)
            .map(|room| room.document.snapshot())
            .unwrap_or_default();
        if let Err(e) = connection.sender.try_send(Outbound::Snapshot(snapshot)) {
            tracing::warn!(
                room = %room_key,
                connection_id = %id,
                full = matches!(e, TrySendError::Full(_)),
                "Could not queue initial snapshot, connection refused"
            );
            return;
        }

        let room = self.rooms.entry(room_key.clone()).or_insert_with(|| {
            let document = Arc::new(Document::new());
            self.directory.insert(room_key.clone(), Arc::clone(&document));
            tracing::info!(room = %room_key, "Room created");
            Room {
                document,
                members: HashMap::new(),
            }
        });

        self.presence.create_user(&id, &connection.username);
        self.presence.add_user_to_room(&id, &room_key);
        room.members.insert(id.clone(), connection);
        self.locations.insert(id.clone(), room_key.clone());

        tracing::info!(
            room = %room_key,
            connection_id = %id,
            members = room.members.len(),
            "Connection registered"
        );

        self.broadcast_roster(&room_key);
    }

    fn unregister(&mut self, id: &str) {
        let Some(room_key) = self.locations.remove(id) else {
            tracing::trace!(connection_id = %id, "Unregister for unknown connection ignored");
            return;
        };

        let remaining = match self.rooms.get_mut(&room_key) {
            Some(room) => {
                // Dropping the handle closes the outbound queue
                room.members.remove(id);
                room.members.len()
            }
            None => 0,
        };
        self.presence.remove_user(id);

        tracing::info!(
            room = %room_key,
            connection_id = %id,
            remaining,
            "Connection unregistered"
        );

        self.broadcast_roster(&room_key);
        self.remove_room_if_empty(&room_key);
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let Envelope {
            room: room_key,
            origin,
            frame,
        } = envelope;

        let Some(room) = self.rooms.get(&room_key) else {
            tracing::debug!(room = %room_key, connection_id = %origin, "Dispatch to unknown room dropped");
            return;
        };

        let (frame, cursor) = match frame {
            ClientFrame::Operation(op) => {
                let applied = room.document.apply(&op);
                tracing::debug!(room = %room_key, connection_id = %origin, op = %applied, "Operation applied");
                let cursor = applied.position() + applied.inserted_len();
                (ClientFrame::Operation(applied), cursor)
            }
            ClientFrame::Replace(content) => {
                room.document.replace(content.as_str());
                let cursor = content.chars().count();
                (ClientFrame::Replace(content), cursor)
            }
        };

        self.presence.update_cursor(&origin, cursor);
        self.fan_out(&room_key, Some(&origin), Outbound::Remote(Arc::new(frame)));
    }

    /// Send the current roster to every member of a room
    fn broadcast_roster(&mut self, room_key: &str) {
        if !self.rooms.contains_key(room_key) {
            return;
        }

        let users = self.presence.room_users(room_key);
        let encoded = match serde_json::to_string(&ServerMessage::user_list(&users)) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(room = %room_key, error = %e, "Failed to encode user list");
                return;
            }
        };

        self.fan_out(room_key, None, Outbound::Roster(Arc::from(encoded)));
    }

    /// Enqueue `item` for every member except `except`.
    ///
    /// Members whose queue is full or closed are evicted on the spot and
    /// the survivors get a fresh roster.
    fn fan_out(&mut self, room_key: &str, except: Option<&str>, item: Outbound) {
        let Some(room) = self.rooms.get(room_key) else {
            return;
        };

        let mut dead = Vec::new();
        let mut delivered = 0usize;
        for (id, member) in &room.members {
            if except == Some(id.as_str()) {
                continue;
            }
            match member.sender.try_send(item.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(room = %room_key, connection_id = %id, "Outbound queue full, dropping connection");
                    dead.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(room = %room_key, connection_id = %id, "Outbound queue closed, dropping connection");
                    dead.push(id.clone());
                }
            }
        }

        if delivered > 0 {
            tracing::trace!(room = %room_key, recipients = delivered, "Fan-out");
        }

        if !dead.is_empty() {
            for id in &dead {
                self.evict(room_key, id);
            }
            self.broadcast_roster(room_key);
        }
        self.remove_room_if_empty(room_key);
    }

    /// Drop a member; the caller rebroadcasts the roster
    fn evict(&mut self, room_key: &str, id: &str) {
        if let Some(room) = self.rooms.get_mut(room_key) {
            room.members.remove(id);
        }
        self.locations.remove(id);
        self.presence.remove_user(id);
    }

    fn remove_room_if_empty(&mut self, room_key: &str) {
        if self.rooms.get(room_key).is_some_and(|r| r.members.is_empty()) {
            self.rooms.remove(room_key);
            self.directory.remove(room_key);
            tracing::info!(room = %room_key, "Room deleted (empty)");
        }
    }
}

/// Errors returned by [`HubHandle`]
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Hub is not running")]
    Unavailable,

    #[error("Hub dropped the reply")]
    NoReply,
}

/// Cloneable handle used by connections and request handlers
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    directory: RoomDirectory,
}

impl HubHandle {
    pub fn new(commands: mpsc::Sender<HubCommand>, directory: RoomDirectory) -> Self {
        Self {
            commands,
            directory,
        }
    }

    /// Add a connection to its room, creating the room if needed
    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubError> {
        self.send(HubCommand::Register(connection)).await
    }

    /// Remove a connection; unknown ids are ignored
    pub async fn unregister(&self, id: impl Into<ConnectionId>) -> Result<(), HubError> {
        self.send(HubCommand::Unregister(id.into())).await
    }

    /// Apply a frame to its room and fan it out to the other members
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), HubError> {
        self.send(HubCommand::Dispatch(envelope)).await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::Stats(reply)).await?;
        response.await.map_err(|_| HubError::NoReply)
    }

    /// Copies of the roster of a room
    pub async fn room_users(&self, room: impl Into<RoomKey>) -> Result<Vec<User>, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::RoomUsers {
            room: room.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| HubError::NoReply)
    }

    /// Current content and version of a room; empty if the room does not exist
    pub fn snapshot(&self, room: &str) -> DocumentSnapshot {
        self.directory
            .get(room)
            .map(|doc| doc.snapshot())
            .unwrap_or_default()
    }

    pub fn room_content(&self, room: &str) -> String {
        self.snapshot(room).content
    }

    pub fn room_exists(&self, room: &str) -> bool {
        self.directory.contains(room)
    }

    pub fn room_count(&self) -> usize {
        self.directory.len()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::Unavailable)
    }
}
