//! Inbound frame dispatch
//!
//! Every decoded envelope invokes at most one callback. Frames are handled
//! inline on the driver task, so callbacks see them in arrival order.

use crate::core::presence::PresenceTracker;
use crate::core::rooms::RoomRegistry;
use crate::protocol::{Envelope, Identity, RoomMember};
use crate::traits::RealtimeHandler;
use std::sync::Arc;
use tracing::debug;

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The named callback was invoked
    Delivered(&'static str),
    /// No callback was invoked
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Liveness frame, nothing to deliver
    Ping,
    /// Addressed to a room other than the one held
    OtherRoom,
    /// Echo of the local user's own typing or membership
    OwnEcho,
    /// Join of someone already present, or leave of someone absent
    PresenceUnchanged,
}

pub struct MessageRouter {
    handler: Arc<dyn RealtimeHandler>,
    rooms: Arc<RoomRegistry>,
    presence: Arc<PresenceTracker>,
}

impl MessageRouter {
    pub fn new(
        handler: Arc<dyn RealtimeHandler>,
        rooms: Arc<RoomRegistry>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            handler,
            rooms,
            presence,
        }
    }

    pub fn dispatch(&self, envelope: Envelope, local: &Identity) -> Dispatch {
        let Some(room_id) = envelope.room_id() else {
            debug!("Ping frame received");
            return Dispatch::Dropped(DropReason::Ping);
        };

        if !self.rooms.is_in(room_id) {
            debug!("Dropping '{}' frame for room {} (not held)", envelope.kind(), room_id);
            return Dispatch::Dropped(DropReason::OtherRoom);
        }

        match envelope {
            Envelope::Message(message) => {
                self.handler.on_message(message);
                Dispatch::Delivered("on_message")
            }
            Envelope::Typing(indicator) => {
                if indicator.user_id == local.user_id {
                    return Dispatch::Dropped(DropReason::OwnEcho);
                }
                self.handler.on_typing(indicator);
                Dispatch::Delivered("on_typing")
            }
            Envelope::JoinRoom(member) | Envelope::UserJoined(member) => self.joined(member, local),
            Envelope::LeaveRoom(member) | Envelope::UserLeft(member) => self.left(member, local),
            Envelope::Ping => Dispatch::Dropped(DropReason::Ping),
        }
    }

    fn joined(&self, member: RoomMember, local: &Identity) -> Dispatch {
        if member.user_id == local.user_id {
            return Dispatch::Dropped(DropReason::OwnEcho);
        }
        if !self.presence.insert(&member) {
            debug!("User {} already present in {}", member.user_id, member.room_id);
            return Dispatch::Dropped(DropReason::PresenceUnchanged);
        }
        debug!("User {} joined {}", member.user_id, member.room_id);
        self.handler.on_user_joined(member);
        Dispatch::Delivered("on_user_joined")
    }

    fn left(&self, member: RoomMember, local: &Identity) -> Dispatch {
        if member.user_id == local.user_id {
            return Dispatch::Dropped(DropReason::OwnEcho);
        }
        match self.presence.remove(&member) {
            Some(known) => {
                debug!("User {} left {}", member.user_id, member.room_id);
                // Leave frames often omit the name; prefer what the join told us
                let user_name = member.user_name.or(known.user_name);
                self.handler.on_user_left(RoomMember { user_name, ..member });
                Dispatch::Delivered("on_user_left")
            }
            None => Dispatch::Dropped(DropReason::PresenceUnchanged),
        }
    }
}
