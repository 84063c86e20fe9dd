use crate::protocol::{Envelope, Identity};
use crate::traits::error::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Normalized lifecycle signal emitted by every adapter
///
/// Provider-specific connect/error/member events are folded into these four
/// so the manager never branches on provider type.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The provider acknowledged the connection; sends may begin
    Opened,
    /// A decoded inbound frame
    Frame(Envelope),
    /// Adapter-level failure while connected
    Error(String),
    /// The underlying link is gone
    Closed(Option<String>),
}

/// Sending half of an adapter's signal channel
pub type SignalSender = mpsc::UnboundedSender<TransportSignal>;

/// Receiving half of an adapter's signal channel
pub type SignalReceiver = mpsc::UnboundedReceiver<TransportSignal>;

/// Provider discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Raw bidirectional websocket speaking the envelope protocol directly
    NativeSocket,
    /// Managed pub/sub provider (Pusher Channels protocol)
    Pusher,
    /// Caller-supplied adapter
    Custom,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::NativeSocket => f.write_str("native-socket"),
            Provider::Pusher => f.write_str("pusher"),
            Provider::Custom => f.write_str("custom"),
        }
    }
}

/// Uniform contract over one concrete transport
///
/// Exactly one adapter is active per `ConnectionManager`, and it is owned
/// exclusively by the manager's driver task. `open` may be called again
/// after `close` to reconnect.
///
/// Adapters are the only components that touch the network.
#[async_trait]
pub trait TransportAdapter: Send {
    fn provider(&self) -> Provider;

    /// Establish the underlying link
    ///
    /// On success the adapter must emit `TransportSignal::Opened` on
    /// `signals` once the provider has acknowledged the connection, and from
    /// then on deliver every inbound frame, error and close through it in
    /// arrival order.
    async fn open(&mut self, identity: &Identity, signals: SignalSender) -> Result<()>;

    /// Transmit one envelope
    async fn send(&mut self, envelope: &Envelope) -> Result<()>;

    /// Start receiving traffic for `room_id`
    ///
    /// Returns once the subscribe request is issued; the provider's
    /// acknowledgement arrives asynchronously.
    async fn subscribe(&mut self, room_id: &str, identity: &Identity) -> Result<()>;

    /// Stop receiving traffic for `room_id`
    async fn unsubscribe(&mut self, room_id: &str, identity: &Identity) -> Result<()>;

    /// Tear down the link; no signals are emitted afterwards
    async fn close(&mut self);
}
