//! WebSocket Message Types
//!
//! Client frames are either a structured edit operation or the full
//! document text; the two are told apart by a leading `{`. Server frames
//! are either the full document text or a roster update.

use serde::Serialize;

use crate::ot::{DocumentState, OtResult, Operation};
use crate::presence::{User, UserInfo};

/// A decoded text frame from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Structured Insert/Delete edit
    Operation(Operation),
    /// Whole-document replacement
    Replace(String),
}

impl ClientFrame {
    /// Decode a text frame.
    ///
    /// Newlines are folded to spaces and surrounding whitespace trimmed.
    /// A payload starting with `{` must decode as an operation; anything
    /// else is taken verbatim as replacement text.
    pub fn decode(text: &str) -> OtResult<Self> {
        let normalized = text.replace('\n', " ");
        let payload = normalized.trim();

        if payload.starts_with('{') {
            Ok(ClientFrame::Operation(Operation::from_json(payload)?))
        } else {
            Ok(ClientFrame::Replace(payload.to_string()))
        }
    }

    /// Apply this frame to a document state, the same way the hub does
    pub fn apply_to(&self, state: &mut DocumentState) {
        match self {
            ClientFrame::Operation(op) => {
                state.apply(op);
            }
            ClientFrame::Replace(content) => state.replace(content.as_str()),
        }
    }
}

/// Structured messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Current roster of a room
    #[serde(rename = "userList")]
    UserList { users: Vec<UserInfo> },
}

impl ServerMessage {
    pub fn user_list(users: &[User]) -> Self {
        ServerMessage::UserList {
            users: users.iter().map(UserInfo::from).collect(),
        }
    }
}
