//! Edit Operations
//!
//! Immutable Insert/Delete descriptors. Positions and lengths count Unicode
//! code points, never bytes.
//!
//! The wire form is a flat JSON object:
//!
//! ```json
//! {"type": "insert", "position": 3, "character": "x", "version": 7, "clientId": "abc"}
//! {"type": "delete", "position": 3, "length": 2, "version": 7, "clientId": "abc"}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{OtError, OtResult};

/// Identifier of the connection that issued an operation
pub type ClientId = String;

/// What an operation does to the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Insert `text` before the code point at `position`
    Insert { position: usize, text: String },
    /// Remove `length` code points starting at `position`
    Delete { position: usize, length: usize },
}

/// A single edit, tagged with the version its issuer believed was current
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireOperation", into = "WireOperation")]
pub struct Operation {
    kind: OpKind,
    version: u64,
    origin: ClientId,
}

impl Operation {
    /// Create an insert operation
    pub fn insert(
        position: usize,
        text: impl Into<String>,
        version: u64,
        origin: impl Into<ClientId>,
    ) -> Self {
        Self {
            kind: OpKind::Insert {
                position,
                text: text.into(),
            },
            version,
            origin: origin.into(),
        }
    }

    /// Create a delete operation
    pub fn delete(position: usize, length: usize, version: u64, origin: impl Into<ClientId>) -> Self {
        Self {
            kind: OpKind::Delete { position, length },
            version,
            origin: origin.into(),
        }
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn position(&self) -> usize {
        match self.kind {
            OpKind::Insert { position, .. } | OpKind::Delete { position, .. } => position,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self.kind, OpKind::Insert { .. })
    }

    /// Number of code points this operation adds to the document
    pub fn inserted_len(&self) -> usize {
        match &self.kind {
            OpKind::Insert { text, .. } => text.chars().count(),
            OpKind::Delete { .. } => 0,
        }
    }

    /// Copy of this operation with a different kind, keeping version and origin
    pub(crate) fn with_kind(&self, kind: OpKind) -> Self {
        Self {
            kind,
            version: self.version,
            origin: self.origin.clone(),
        }
    }

    /// Copy of this operation stamped with a new version
    pub(crate) fn with_version(&self, version: u64) -> Self {
        Self {
            kind: self.kind.clone(),
            version,
            origin: self.origin.clone(),
        }
    }

    /// Decode an operation from its JSON wire form
    pub fn from_json(json: &str) -> OtResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode this operation to its JSON wire form
    pub fn to_json(&self) -> OtResult<String> {
        serde_json::to_string(self).map_err(|e| OtError::Encode(e.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OpKind::Insert { position, text } => {
                write!(f, "Insert('{}', {}) v{}", text, position, self.version)
            }
            OpKind::Delete { position, length } => {
                write!(f, "Delete({}, {}) v{}", position, length, self.version)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireKind {
    Insert,
    Delete,
}

/// Flat JSON shape shared with browser clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOperation {
    #[serde(rename = "type")]
    kind: WireKind,
    position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<usize>,
    #[serde(default)]
    version: u64,
    #[serde(default)]
    client_id: String,
}

impl TryFrom<WireOperation> for Operation {
    type Error = OtError;

    fn try_from(wire: WireOperation) -> Result<Self, Self::Error> {
        let kind = match wire.kind {
            WireKind::Insert => match wire.character {
                Some(text) if !text.is_empty() => OpKind::Insert {
                    position: wire.position,
                    text,
                },
                _ => return Err(OtError::EmptyInsert),
            },
            WireKind::Delete => OpKind::Delete {
                position: wire.position,
                length: wire.length.unwrap_or(0),
            },
        };

        Ok(Self {
            kind,
            version: wire.version,
            origin: wire.client_id,
        })
    }
}

impl From<Operation> for WireOperation {
    fn from(op: Operation) -> Self {
        let (kind, position, character, length) = match op.kind {
            OpKind::Insert { position, text } => (WireKind::Insert, position, Some(text), None),
            OpKind::Delete { position, length } => {
                (WireKind::Delete, position, None, Some(length))
            }
        };

        Self {
            kind,
            position,
            character,
            length,
            version: op.version,
            client_id: op.origin,
        }
    }
}
