//! Caller-facing callback set
//!
//! # Architecture
//!
//! ```text
//! Adapter → TransportSignal → Driver task → MessageRouter → RealtimeHandler
//!                                  │                              ↑
//!                                  └── lifecycle (connect/drop) ──┘
//! ```
//!
//! # Ordering Guarantees
//!
//! - Each inbound frame invokes at most one callback
//! - Callbacks for one room occupancy run in frame arrival order
//! - No ordering is promised across a reconnect
//!
//! Callbacks run on the driver task. They must not block; hand heavy work
//! off to another task or use [`ChannelHandler`].

use crate::protocol::{ChatMessage, RoomMember, TypingIndicator};
use crate::traits::error::RealtimeError;
use crossbeam_channel::{unbounded, Receiver, RecvError, Sender};

/// Optional handlers bound once at construction
///
/// Every method has a no-op default, so implementors override only what
/// they need. The manager never mutates caller-owned state; it only
/// invokes these.
///
/// # Example
///
/// ```ignore
/// struct ChatPane {
///     unread: Arc<AtomicU64>,
/// }
///
/// impl RealtimeHandler for ChatPane {
///     fn on_message(&self, message: ChatMessage) {
///         self.unread.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait RealtimeHandler: Send + Sync + 'static {
    /// The transport opened (initially or after a reconnect)
    fn on_connect(&self) {}

    /// The connection dropped or was closed
    fn on_disconnect(&self) {}

    fn on_message(&self, _message: ChatMessage) {}

    fn on_typing(&self, _indicator: TypingIndicator) {}

    /// Connect failures, rejected room operations, transport errors and
    /// the fatal `ReconnectExhausted`
    fn on_error(&self, _error: RealtimeError) {}

    fn on_user_joined(&self, _member: RoomMember) {}

    fn on_user_left(&self, _member: RoomMember) {}
}

/// A handler that ignores everything
pub struct NoOpHandler;

impl RealtimeHandler for NoOpHandler {}

/// Callback invocation reified as a value
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    Message(ChatMessage),
    Typing(TypingIndicator),
    Error(RealtimeError),
    UserJoined(RoomMember),
    UserLeft(RoomMember),
}

/// Handler that forwards every callback into an unbounded channel
///
/// Lets callers drive their own dispatch loop instead of running code on
/// the driver task.
///
/// ```ignore
/// let (handler, events) = ChannelHandler::new();
/// let manager = ConnectionManager::builder()
///     .native_socket("wss://clinic.example/ws")
///     .handler(handler)
///     .build();
///
/// while let Ok(event) = events.recv() {
///     render(event);
/// }
/// ```
pub struct ChannelHandler {
    tx: Sender<RealtimeEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, EventStream) {
        let (tx, rx) = unbounded();
        (Self { tx }, EventStream { rx })
    }

    fn forward(&self, event: RealtimeEvent) {
        // Receiver dropped means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

impl RealtimeHandler for ChannelHandler {
    fn on_connect(&self) {
        self.forward(RealtimeEvent::Connected);
    }

    fn on_disconnect(&self) {
        self.forward(RealtimeEvent::Disconnected);
    }

    fn on_message(&self, message: ChatMessage) {
        self.forward(RealtimeEvent::Message(message));
    }

    fn on_typing(&self, indicator: TypingIndicator) {
        self.forward(RealtimeEvent::Typing(indicator));
    }

    fn on_error(&self, error: RealtimeError) {
        self.forward(RealtimeEvent::Error(error));
    }

    fn on_user_joined(&self, member: RoomMember) {
        self.forward(RealtimeEvent::UserJoined(member));
    }

    fn on_user_left(&self, member: RoomMember) {
        self.forward(RealtimeEvent::UserLeft(member));
    }
}

/// Receiving side of a [`ChannelHandler`]
#[derive(Clone)]
pub struct EventStream {
    rx: Receiver<RealtimeEvent>,
}

impl EventStream {
    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<RealtimeEvent> {
        self.rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> std::result::Result<RealtimeEvent, RecvError> {
        self.rx.recv()
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<RealtimeEvent> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_handler_preserves_order() {
        let (handler, events) = ChannelHandler::new();
        handler.on_connect();
        handler.on_user_joined(RoomMember {
            room_id: "r".into(),
            user_id: "u1".into(),
            user_name: None,
        });
        handler.on_disconnect();

        let drained = events.drain();
        assert_eq!(drained.len(), 3);
        assert!(matches!(drained[0], RealtimeEvent::Connected));
        assert!(matches!(&drained[1], RealtimeEvent::UserJoined(m) if m.user_id == "u1"));
        assert!(matches!(drained[2], RealtimeEvent::Disconnected));
        assert!(events.try_recv_event().is_none());
    }
}
