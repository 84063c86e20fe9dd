//! Chat payload types carried inside envelopes

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a message id unique for the lifetime of the process
///
/// Format: `msg_<millis>_<seq>_<rand>`. The sequence number alone
/// guarantees uniqueness; the timestamp and random suffix keep ids from
/// different processes apart.
pub fn next_message_id() -> String {
    let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("msg_{}_{}_{:06x}", now_millis(), seq, suffix)
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Kind of chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    #[default]
    Text,
    System,
    Typing,
    File,
    AppointmentUpdate,
    Notification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
            MessageKind::Typing => "typing",
            MessageKind::File => "file",
            MessageKind::AppointmentUpdate => "appointment-update",
            MessageKind::Notification => "notification",
        };
        f.write_str(s)
    }
}

/// A chat message as sent over the wire
///
/// `content` is opaque to the transport; signaling payloads for video
/// calls travel here as serialized strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    pub timestamp: i64,
    pub room_id: String,
}

impl ChatMessage {
    /// Build a new message with a fresh id and the current timestamp
    pub fn new(
        kind: MessageKind,
        content: impl Into<String>,
        sender: &Identity,
        room_id: impl Into<String>,
    ) -> Self {
        Self {
            id: next_message_id(),
            kind,
            content: content.into(),
            sender_id: sender.user_id.clone(),
            sender_name: sender.user_name.clone(),
            timestamp: now_millis(),
            room_id: room_id.into(),
        }
    }
}

/// Transient typing signal; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub user_id: String,
    pub user_name: String,
    pub room_id: String,
    pub is_typing: bool,
}

/// Membership payload for join/leave frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub room_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

/// The local user, as supplied by the session system before `connect()`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }

    /// Membership record for this user in `room_id`
    pub fn member_of(&self, room_id: &str) -> RoomMember {
        RoomMember {
            room_id: room_id.to_string(),
            user_id: self.user_id.clone(),
            user_name: Some(self.user_name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_message_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| next_message_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let sender = Identity::new("doc-7", "Dr. Adeyemi");
        let msg = ChatMessage::new(MessageKind::AppointmentUpdate, "moved to 3pm", &sender, "clinic-42");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "appointment-update");
        assert_eq!(json["senderId"], "doc-7");
        assert_eq!(json["senderName"], "Dr. Adeyemi");
        assert_eq!(json["roomId"], "clinic-42");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_missing_kind_defaults_to_text() {
        let json = r#"{"id":"m1","content":"hi","senderId":"u1","senderName":"Ana","timestamp":1,"roomId":"r"}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
    }
}
