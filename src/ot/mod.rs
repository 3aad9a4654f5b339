//! Edit Reconciliation
//!
//! The operation model and the per-room document it mutates:
//!
//! - **operation**: Insert/Delete descriptors and their JSON wire form
//! - **transform**: Pairwise position adjustment between two operations
//! - **document**: Versioned text buffer with a lock-guarded shared wrapper
//! - **error**: Error types
//!
//! # Mutation paths
//!
//! ```text
//! Structured:  Operation → clamp to bounds → apply → version + 1
//! Plain text:  content   → replace whole buffer   → version = 0
//! ```
//!
//! # Example
//!
//! ```rust
//! use collabwrite::ot::{Document, Operation};
//!
//! let doc = Document::with_content("hello");
//! let applied = doc.apply(&Operation::insert(1, "Z", 0, "client-1"));
//!
//! assert_eq!(doc.content(), "hZello");
//! assert_eq!(applied.version(), 1);
//! ```

pub mod document;
pub mod error;
pub mod operation;
pub mod transform;

pub use document::{Document, DocumentSnapshot, DocumentState};
pub use error::{OtError, OtResult};
pub use operation::{ClientId, OpKind, Operation};
pub use transform::transform;
