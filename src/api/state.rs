//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::config::ConnectionConfig;
use crate::websocket::HubHandle;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running hub actor
    pub hub: HubHandle,
    /// Per-connection timing and limits
    pub connection: Arc<ConnectionConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hub: HubHandle, connection: ConnectionConfig) -> Self {
        Self {
            hub,
            connection: Arc::new(connection),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
