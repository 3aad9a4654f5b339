//! Room Routes
//!
//! Read-only views of rooms plus room key allocation.
//!
//! - POST /api/v1/rooms - Allocate a new room key
//! - GET /api/v1/rooms/:room - Current document snapshot
//! - GET /api/v1/rooms/:room/users - Current roster

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;

use crate::api::dto::{CreateRoomResponse, RoomResponse, RoomUserDto, RoomUsersResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// Longest accepted room key, in characters
pub const MAX_ROOM_KEY_CHARS: usize = 128;

const GENERATED_KEY_LEN: usize = 10;

/// Reject room keys that are empty, too long, or contain control characters
pub fn validate_room_key(room: &str) -> ApiResult<()> {
    if room.trim().is_empty() {
        return Err(ApiError::Validation("Room key must not be empty".to_string()));
    }
    if room.chars().count() > MAX_ROOM_KEY_CHARS {
        return Err(ApiError::Validation(format!(
            "Room key exceeds {} characters",
            MAX_ROOM_KEY_CHARS
        )));
    }
    if room.chars().any(char::is_control) {
        return Err(ApiError::Validation(
            "Room key must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/v1/rooms/:room
///
/// Snapshot read; does not go through the hub. Absent rooms read as empty.
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<Json<RoomResponse>> {
    validate_room_key(&room)?;

    let snapshot = state.hub.snapshot(&room);
    Ok(Json(RoomResponse {
        exists: state.hub.room_exists(&room),
        room,
        content: snapshot.content,
        version: snapshot.version,
    }))
}

/// GET /api/v1/rooms/:room/users
pub async fn get_room_users(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<Json<RoomUsersResponse>> {
    validate_room_key(&room)?;

    let users: Vec<RoomUserDto> = state
        .hub
        .room_users(room.clone())
        .await?
        .into_iter()
        .map(RoomUserDto::from)
        .collect();

    Ok(Json(RoomUsersResponse {
        room,
        count: users.len(),
        users,
    }))
}

/// POST /api/v1/rooms
///
/// Allocate a random room key. The room itself only comes into existence
/// when the first socket joins it.
pub async fn create_room() -> (StatusCode, Json<CreateRoomResponse>) {
    let room: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_KEY_LEN)
        .map(char::from)
        .collect();

    tracing::debug!(room = %room, "Allocated room key");

    (
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            socket_path: format!("/ws/{}", room),
            room,
        }),
    )
}
