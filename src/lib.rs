//! # collabwrite
//!
//! Real-time collaborative text editing over WebSocket rooms.
//!
//! ## Features
//!
//! - **Rooms**: Created on first join, deleted when the last member leaves
//! - **Edits**: Code-point Insert/Delete operations or whole-text replacement
//! - **Presence**: Per-room rosters with stable display colors
//! - **Backpressure**: Slow consumers are evicted instead of stalling a room
//!
//! ## Modules
//!
//! - [`ot`]: Operations, transform and the shared document
//! - [`presence`]: User registry and room rosters
//! - [`websocket`]: Hub actor, connections and socket pumps
//! - [`api`]: HTTP server with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust
//! use collabwrite::ot::{Document, Operation};
//!
//! let doc = Document::with_content("hello");
//! doc.apply(&Operation::insert(1, "Z", 0, "client-a"));
//!
//! assert_eq!(doc.content(), "hZello");
//! assert_eq!(doc.version(), 1);
//! ```

pub mod api;
pub mod config;
pub mod ot;
pub mod presence;
pub mod websocket;

// Re-export top-level types for convenience
pub use ot::{
    transform, ClientId, Document, DocumentSnapshot, DocumentState, OpKind, Operation, OtError,
    OtResult,
};

pub use presence::{PresenceRegistry, User, UserInfo};

pub use api::{build_router, serve, ApiError, AppState};

pub use websocket::{
    websocket_handler, ClientFrame, Hub, HubError, HubHandle, HubStats, ServerMessage,
};

pub use config::{
    Config, ConfigError, ConnectionConfig, HubConfig, LoggingConfig, ServerConfig,
};
