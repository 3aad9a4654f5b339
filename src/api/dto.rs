//! Data Transfer Objects
//!
//! Response types for the API endpoints.
//! These types are serialized to JSON.

use serde::Serialize;

use crate::presence::User;

// ============================================
// ROOM DTOs
// ============================================

/// Snapshot of a room's document
#[derive(Debug, Serialize)]
pub struct RoomResponse {
    /// Room key
    pub room: String,
    /// Whether the room currently has members
    pub exists: bool,
    /// Full document text (empty for absent rooms)
    pub content: String,
    /// Document version (0 for absent rooms)
    pub version: u64,
}

/// Newly allocated room
#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    /// Random room key
    pub room: String,
    /// Path to open a socket on
    pub socket_path: String,
}

/// Single roster entry
#[derive(Debug, Serialize)]
pub struct RoomUserDto {
    pub id: String,
    pub username: String,
    pub color: String,
    /// Last known cursor position, in code points
    pub cursor: usize,
    /// Last activity, ms since epoch
    pub last_seen: i64,
}

impl From<User> for RoomUserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            color: user.color,
            cursor: user.cursor,
            last_seen: user.last_seen.timestamp_millis(),
        }
    }
}

/// Room roster response
#[derive(Debug, Serialize)]
pub struct RoomUsersResponse {
    pub room: String,
    pub users: Vec<RoomUserDto>,
    pub count: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy or unhealthy
    pub status: String,
    /// Hub actor status
    pub hub: String,
    /// Number of live rooms
    pub rooms: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
