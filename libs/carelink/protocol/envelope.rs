//! Transport-agnostic wire envelope
//!
//! ```text
//! { "type": "message" | "typing" | "join-room" | "leave-room"
//!         | "ping" | "user-joined" | "user-left",
//!   "data": <payload> }
//! ```
//!
//! `ping` carries no payload and expects no pong frame.

use super::message::{ChatMessage, RoomMember, TypingIndicator};
use crate::traits::error::{RealtimeError, Result};
use serde::{Deserialize, Serialize};

/// Every `type` discriminator understood by this crate
pub const KNOWN_TYPES: [&str; 7] = [
    "message",
    "typing",
    "join-room",
    "leave-room",
    "ping",
    "user-joined",
    "user-left",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Envelope {
    Message(ChatMessage),
    Typing(TypingIndicator),
    JoinRoom(RoomMember),
    LeaveRoom(RoomMember),
    Ping,
    UserJoined(RoomMember),
    UserLeft(RoomMember),
}

impl Envelope {
    /// The wire discriminator of this envelope
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Message(_) => "message",
            Envelope::Typing(_) => "typing",
            Envelope::JoinRoom(_) => "join-room",
            Envelope::LeaveRoom(_) => "leave-room",
            Envelope::Ping => "ping",
            Envelope::UserJoined(_) => "user-joined",
            Envelope::UserLeft(_) => "user-left",
        }
    }

    /// Room this envelope is scoped to, if any
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Envelope::Message(m) => Some(&m.room_id),
            Envelope::Typing(t) => Some(&t.room_id),
            Envelope::JoinRoom(m)
            | Envelope::LeaveRoom(m)
            | Envelope::UserJoined(m)
            | Envelope::UserLeft(m) => Some(&m.room_id),
            Envelope::Ping => None,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a text frame
    ///
    /// # Returns
    /// * `Ok(Some(envelope))` - A well-formed frame of a known type
    /// * `Ok(None)` - A well-formed frame with an unknown `type`
    /// * `Err(RealtimeError::Protocol)` - Malformed JSON or payload
    pub fn decode(text: &str) -> Result<Option<Envelope>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| RealtimeError::Protocol("frame has no type discriminator".into()))?
            .to_string();

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RealtimeError::Protocol(format!("bad '{}' payload: {}", kind, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_has_no_payload() {
        assert_eq!(Envelope::Ping.encode().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(Envelope::decode(r#"{"type":"ping"}"#).unwrap(), Some(Envelope::Ping));
    }

    #[test]
    fn test_join_room_payload() {
        let env = Envelope::decode(r#"{"type":"join-room","data":{"roomId":"clinic-42","userId":"p-1"}}"#)
            .unwrap()
            .unwrap();
        match env {
            Envelope::JoinRoom(member) => {
                assert_eq!(member.room_id, "clinic-42");
                assert_eq!(member.user_id, "p-1");
                assert_eq!(member.user_name, None);
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        assert_eq!(Envelope::decode(r#"{"type":"reaction","data":{}}"#).unwrap(), None);
    }

    #[test]
    fn test_malformed_frames_are_protocol_errors() {
        assert!(matches!(
            Envelope::decode("not json"),
            Err(RealtimeError::Protocol(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"data":{}}"#),
            Err(RealtimeError::Protocol(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type":"typing","data":{"userId":"u"}}"#),
            Err(RealtimeError::Protocol(_))
        ));
    }

    #[test]
    fn test_bad_payload_error_names_the_frame_type() {
        match Envelope::decode(r#"{"type":"message","data":{"id":"m-1"}}"#) {
            Err(RealtimeError::Protocol(reason)) => {
                assert!(reason.starts_with("bad 'message' payload"), "{}", reason)
            }
            other => panic!("expected a protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_room_scoping() {
        let typing = Envelope::Typing(TypingIndicator {
            user_id: "u".into(),
            user_name: "U".into(),
            room_id: "r-1".into(),
            is_typing: true,
        });
        assert_eq!(typing.room_id(), Some("r-1"));
        assert_eq!(typing.kind(), "typing");
        assert_eq!(Envelope::Ping.room_id(), None);
    }
}
