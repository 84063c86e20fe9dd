//! # Carelink Traits
//!
//! Extension seams and shared error types:
//!
//! - **TransportAdapter**: One concrete transport behind a uniform contract
//! - **RealtimeHandler**: The callback set invoked by the manager
//! - **ReconnectionStrategy**: Backoff and attempt ceiling after a drop
//! - **PassivePingDetector**: Answer provider data-level pings
//! - **ChannelAuthorizer**: Sign presence channel subscriptions

pub mod auth;
pub mod error;
pub mod handler;
pub mod passive_ping;
pub mod reconnect;
pub mod transport;

pub use auth::{ChannelAuth, ChannelAuthorizer};
pub use error::{RealtimeError, Result, SendError};
pub use handler::{ChannelHandler, EventStream, NoOpHandler, RealtimeEvent, RealtimeHandler};
pub use passive_ping::{JsonPassivePing, NoOpPassivePing, PassivePingDetector};
pub use reconnect::{ExponentialBackoff, NeverReconnect, ReconnectionStrategy};
pub use transport::{Provider, SignalReceiver, SignalSender, TransportAdapter, TransportSignal};
