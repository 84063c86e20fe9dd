use serde_json::Value;

/// Trait for detecting and responding to passive ping messages
///
/// Some providers send pings as regular data messages (not websocket PING
/// frames) and close the connection if no reply arrives. This trait lets an
/// adapter detect those messages and answer them without involving the
/// manager.
///
/// # Flow
/// ```text
/// Server ──[ping]──> SocketLink
///                       │
///                       ├─> is_ping() checks message
///                       │
///                       └─> pong_response() is sent immediately
///                           (the ping never reaches the router)
/// ```
pub trait PassivePingDetector: Send + Sync {
    /// Check if a text frame is a passive ping from the server
    fn is_ping(&self, text: &str) -> bool;

    /// The text frame to send back
    fn pong_response(&self) -> String;
}

/// A detector that never matches
pub struct NoOpPassivePing;

impl PassivePingDetector for NoOpPassivePing {
    fn is_ping(&self, _text: &str) -> bool {
        false
    }

    fn pong_response(&self) -> String {
        String::new()
    }
}

/// JSON-based passive ping detector
///
/// Detects JSON messages with a specific field/value and responds with a
/// fixed JSON message.
///
/// # Example
/// ```ignore
/// // Detect {"event":"pusher:ping"} and respond with {"event":"pusher:pong"}
/// let detector = JsonPassivePing::new(
///     "event",
///     "pusher:ping",
///     r#"{"event":"pusher:pong","data":{}}"#,
/// );
/// ```
pub struct JsonPassivePing {
    field_name: String,
    ping_value: String,
    pong_response: String,
}

impl JsonPassivePing {
    pub fn new(
        field_name: impl Into<String>,
        ping_value: impl Into<String>,
        pong_response: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            ping_value: ping_value.into(),
            pong_response: pong_response.into(),
        }
    }
}

impl PassivePingDetector for JsonPassivePing {
    fn is_ping(&self, text: &str) -> bool {
        // Cheap reject before parsing every frame
        if !text.contains(&self.ping_value) {
            return false;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(json) => json.get(&self.field_name).and_then(Value::as_str) == Some(&self.ping_value),
            Err(_) => false,
        }
    }

    fn pong_response(&self) -> String {
        self.pong_response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_passive_ping() {
        let detector = JsonPassivePing::new("event", "pusher:ping", r#"{"event":"pusher:pong"}"#);

        assert!(detector.is_ping(r#"{"event":"pusher:ping","data":{}}"#));
        assert!(!detector.is_ping(r#"{"event":"pusher:pong","data":{}}"#));
        assert!(!detector.is_ping(r#"{"data":"pusher:ping"}"#));
        assert!(!detector.is_ping("pusher:ping"));
        assert_eq!(detector.pong_response(), r#"{"event":"pusher:pong"}"#);
    }

    #[test]
    fn test_noop_passive_ping() {
        assert!(!NoOpPassivePing.is_ping(r#"{"type":"ping"}"#));
    }
}
