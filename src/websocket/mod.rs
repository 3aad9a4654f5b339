//! WebSocket Collaboration
//!
//! Real-time shared editing over WebSocket rooms.
//!
//! ## Architecture
//!
//! - **Hub**: Single actor owning rooms, memberships, documents and presence
//! - **Connection**: One participant; split into a hub handle and two pumps
//! - **Pumps**: The socket reader and the socket writer
//! - **Messages**: Client frame decoding and server message formats
//!
//! ## Usage
//!
//! Clients connect to `/ws/{room}?name=Alice` and send either a JSON edit
//! operation or the whole document text. Every other member of the room
//! receives the full document text after each edit, plus a `userList`
//! message whenever the roster changes.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080/ws/notes?name=Alice');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'insert', position: 0, character: 'h', version: 0, clientId: 'a'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   console.log('Received:', event.data);
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;
mod pump;

pub use connection::{Connection, ConnectionHandle, ConnectionId, Outbound, RoomKey};
pub use handler::{websocket_handler, JoinParams};
pub use hub::{
    Envelope, Hub, HubCommand, HubError, HubHandle, HubStats, RoomDirectory,
};
pub use messages::{ClientFrame, ServerMessage};
pub use pump::{InboundPump, OutboundPump, PumpError};
