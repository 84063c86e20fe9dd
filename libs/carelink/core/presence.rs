//! Per-room presence sets
//!
//! Mutated only by explicit join/leave signals. Message traffic never
//! adds or removes anyone.

use crate::protocol::RoomMember;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct PresenceTracker {
    rooms: RwLock<HashMap<String, HashMap<String, RoomMember>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `room_id` with an empty set
    pub fn reset(&self, room_id: &str) {
        self.rooms.write().insert(room_id.to_string(), HashMap::new());
    }

    /// Forget everything known about `room_id`
    pub fn clear(&self, room_id: &str) {
        self.rooms.write().remove(room_id);
    }

    /// Record a join
    ///
    /// Returns `true` only if the user was not already present, so repeated
    /// join signals produce a single `on_user_joined`. Members of rooms that
    /// are not tracked are ignored.
    pub fn insert(&self, member: &RoomMember) -> bool {
        let mut rooms = self.rooms.write();
        match rooms.get_mut(&member.room_id) {
            Some(set) if !set.contains_key(&member.user_id) => {
                set.insert(member.user_id.clone(), member.clone());
                true
            }
            _ => false,
        }
    }

    /// Record a leave, returning the stored record if the user was present
    pub fn remove(&self, member: &RoomMember) -> Option<RoomMember> {
        self.rooms
            .write()
            .get_mut(&member.room_id)
            .and_then(|set| set.remove(&member.user_id))
    }

    pub fn contains(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .read()
            .get(room_id)
            .map(|set| set.contains_key(user_id))
            .unwrap_or(false)
    }

    /// Known-present users of `room_id`, sorted by user id
    pub fn members(&self, room_id: &str) -> Vec<RoomMember> {
        let mut members: Vec<RoomMember> = self
            .rooms
            .read()
            .get(room_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        members
    }
}
