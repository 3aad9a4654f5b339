//! Presence Registry
//!
//! Per-user roster metadata (name, color, cursor, last activity) and the
//! per-room membership of those users. Owned by the hub; every read hands
//! out copies.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Colors assigned to users as they join
pub const PALETTE: [&str; 15] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#F8C471", "#85C1E9", "#F9E79F", "#A9DFBF", "#F5B7B1", "#C8B2DB",
];

const FALLBACK_COLOR: &str = "#4ECDC4";

/// A participant as seen by the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub color: String,
    /// Last reported cursor offset in code points
    pub cursor: usize,
    pub last_seen: DateTime<Utc>,
}

/// Roster entry as sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub color: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            color: user.color.clone(),
        }
    }
}

/// Users and their room membership
pub struct PresenceRegistry {
    users: HashMap<String, User>,
    rooms: HashMap<String, HashSet<String>>,
    rng: StdRng,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Registry with a deterministic color sequence
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            users: HashMap::new(),
            rooms: HashMap::new(),
            rng,
        }
    }

    /// Create (or recreate) a user with a random palette color
    pub fn create_user(&mut self, id: impl Into<String>, username: impl Into<String>) -> User {
        let color = PALETTE
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(FALLBACK_COLOR);

        let user = User {
            id: id.into(),
            username: username.into(),
            color: color.to_string(),
            cursor: 0,
            last_seen: Utc::now(),
        };

        self.users.insert(user.id.clone(), user.clone());
        user
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.users.get(id).cloned()
    }

    /// Add a known user to a room. Unknown ids are ignored.
    pub fn add_user_to_room(&mut self, id: &str, room: &str) {
        if let Some(user) = self.users.get_mut(id) {
            user.last_seen = Utc::now();
            self.rooms
                .entry(room.to_string())
                .or_default()
                .insert(id.to_string());
        }
    }

    pub fn remove_user_from_room(&mut self, id: &str, room: &str) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Copies of every member of a room, ordered by username then id
    pub fn room_users(&self, room: &str) -> Vec<User> {
        let mut users: Vec<User> = self
            .rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|id| self.users.get(id).cloned())
            .collect();

        users.sort_by(|a, b| a.username.cmp(&b.username).then_with(|| a.id.cmp(&b.id)));
        users
    }

    /// Record a cursor offset and mark the user active
    pub fn update_cursor(&mut self, id: &str, position: usize) {
        if let Some(user) = self.users.get_mut(id) {
            user.cursor = position;
            user.last_seen = Utc::now();
        }
    }

    /// Forget a user entirely, including every room membership
    pub fn remove_user(&mut self, id: &str) {
        self.users.remove(id);
        self.rooms.retain(|_, members| {
            members.remove(id);
            !members.is_empty()
        });
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_assigns_palette_color() {
        let mut registry = PresenceRegistry::with_seed(7);
        let user = registry.create_user("u1", "Alice");

        assert_eq!(user.username, "Alice");
        assert_eq!(user.cursor, 0);
        assert!(PALETTE.contains(&user.color.as_str()));
        assert_eq!(registry.get_user("u1"), Some(user));
    }

    #[test]
    fn test_room_membership() {
        let mut registry = PresenceRegistry::with_seed(1);
        registry.create_user("u1", "Bob");
        registry.create_user("u2", "Alice");
        registry.add_user_to_room("u1", "r1");
        registry.add_user_to_room("u2", "r1");
        registry.add_user_to_room("ghost", "r1");

        let names: Vec<_> = registry
            .room_users("r1")
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        registry.remove_user_from_room("u1", "r1");
        assert_eq!(registry.room_users("r1").len(), 1);
        assert!(registry.room_users("other").is_empty());
    }

    #[test]
    fn test_room_users_returns_copies() {
        let mut registry = PresenceRegistry::with_seed(1);
        registry.create_user("u1", "Alice");
        registry.add_user_to_room("u1", "r1");

        let mut snapshot = registry.room_users("r1");
        snapshot[0].username = "Mallory".to_string();

        assert_eq!(registry.room_users("r1")[0].username, "Alice");
    }

    #[test]
    fn test_update_cursor_bumps_last_seen() {
        let mut registry = PresenceRegistry::with_seed(1);
        let created = registry.create_user("u1", "Alice");

        registry.update_cursor("u1", 42);
        let user = registry.get_user("u1").unwrap();
        assert_eq!(user.cursor, 42);
        assert!(user.last_seen >= created.last_seen);

        // Unknown users are ignored
        registry.update_cursor("nobody", 1);
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn test_remove_user_clears_rooms() {
        let mut registry = PresenceRegistry::with_seed(1);
        registry.create_user("u1", "Alice");
        registry.add_user_to_room("u1", "r1");
        registry.add_user_to_room("u1", "r2");

        registry.remove_user("u1");
        assert!(registry.get_user("u1").is_none());
        assert!(registry.room_users("r1").is_empty());
        assert!(registry.room_users("r2").is_empty());
    }

    #[test]
    fn test_user_info_projection() {
        let mut registry = PresenceRegistry::with_seed(3);
        let user = registry.create_user("u1", "Alice");
        let info = UserInfo::from(&user);

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"id\":\"u1\""));
        assert!(json.contains("\"username\":\"Alice\""));
        assert!(json.contains("\"color\""));
    }
}
