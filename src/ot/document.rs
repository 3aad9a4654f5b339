//! Document State
//!
//! Per-room text buffer plus a version counter. [`DocumentState`] is the
//! plain value used for connection shadows; [`Document`] wraps it in a
//! reader/writer lock so snapshots can be read from request handlers while
//! the hub mutates it.

use serde::Serialize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::operation::{OpKind, Operation};

/// Point-in-time copy of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSnapshot {
    pub content: String,
    pub version: u64,
}

/// Text buffer and version counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentState {
    content: String,
    version: u64,
    /// Cached length in code points
    chars: usize,
}

impl DocumentState {
    pub fn new(content: impl Into<String>, version: u64) -> Self {
        let content = content.into();
        let chars = content.chars().count();
        Self {
            content,
            version,
            chars,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Length in code points
    pub fn char_len(&self) -> usize {
        self.chars
    }

    /// Apply an operation, clamping it to the buffer bounds.
    ///
    /// The version increments on every call, even when a delete falls past
    /// the end and removes nothing. Returns the operation as applied: clamped
    /// position/length and stamped with the new version.
    pub fn apply(&mut self, op: &Operation) -> Operation {
        let applied = match op.kind() {
            OpKind::Insert { position, text } => {
                let position = (*position).min(self.chars);
                let at = byte_offset(&self.content, position);
                self.content.insert_str(at, text);
                self.chars += text.chars().count();
                op.with_kind(OpKind::Insert {
                    position,
                    text: text.clone(),
                })
            }
            OpKind::Delete { position, length } => {
                if *position >= self.chars {
                    op.clone()
                } else {
                    let end = position.saturating_add(*length).min(self.chars);
                    let start_byte = byte_offset(&self.content, *position);
                    let end_byte = byte_offset(&self.content, end);
                    self.content.replace_range(start_byte..end_byte, "");
                    self.chars -= end - position;
                    op.with_kind(OpKind::Delete {
                        position: *position,
                        length: end - position,
                    })
                }
            }
        };

        self.version += 1;
        applied.with_version(self.version)
    }

    /// Replace the whole buffer. Resets the version to zero.
    pub fn replace(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.chars = self.content.chars().count();
        self.version = 0;
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            content: self.content.clone(),
            version: self.version,
        }
    }
}

impl From<DocumentSnapshot> for DocumentState {
    fn from(snapshot: DocumentSnapshot) -> Self {
        Self::new(snapshot.content, snapshot.version)
    }
}

/// Byte offset of the code point at `char_index`, or the buffer end
fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(s.len())
}

/// Lock-guarded document shared between the hub and snapshot readers
#[derive(Debug, Default)]
pub struct Document {
    state: RwLock<DocumentState>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(DocumentState::new(content, 0)),
        }
    }

    /// Copy out the current content and version
    pub fn snapshot(&self) -> DocumentSnapshot {
        self.read().snapshot()
    }

    pub fn content(&self) -> String {
        self.read().content().to_string()
    }

    pub fn version(&self) -> u64 {
        self.read().version()
    }

    /// Apply an operation under the write lock
    pub fn apply(&self, op: &Operation) -> Operation {
        self.write().apply(op)
    }

    /// Replace the content under the write lock
    pub fn replace(&self, content: impl Into<String>) {
        self.write().replace(content);
    }

    fn read(&self) -> RwLockReadGuard<'_, DocumentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DocumentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
