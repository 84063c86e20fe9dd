//! Wire protocol: the envelope and the payloads it carries

pub mod envelope;
pub mod message;

pub use envelope::{Envelope, KNOWN_TYPES};
pub use message::{
    next_message_id, now_millis, ChatMessage, Identity, MessageKind, RoomMember, TypingIndicator,
};
