//! Single-room occupancy

use parking_lot::RwLock;

/// Outcome of [`RoomRegistry::join`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomChange {
    /// Already in the requested room
    Unchanged,
    /// Now in the requested room; `previous` was left first
    Switched { previous: Option<String> },
}

/// Tracks the one room the local client occupies
///
/// Joining a new room replaces the old one in a single write, so no reader
/// ever observes two rooms at once.
#[derive(Default)]
pub struct RoomRegistry {
    current: RwLock<Option<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_room(&self) -> Option<String> {
        self.current.read().clone()
    }

    pub fn is_in(&self, room_id: &str) -> bool {
        self.current.read().as_deref() == Some(room_id)
    }

    pub fn join(&self, room_id: &str) -> RoomChange {
        let mut current = self.current.write();
        if current.as_deref() == Some(room_id) {
            return RoomChange::Unchanged;
        }
        let previous = current.replace(room_id.to_string());
        RoomChange::Switched { previous }
    }

    /// Leave the held room, if any
    pub fn leave(&self) -> Option<String> {
        self.current.write().take()
    }

    /// Leave `room_id` only if it is still the held room
    pub fn leave_if(&self, room_id: &str) -> bool {
        let mut current = self.current.write();
        if current.as_deref() == Some(room_id) {
            *current = None;
            true
        } else {
            false
        }
    }
}
