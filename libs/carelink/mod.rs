//! # Carelink
//!
//! Transport-agnostic real-time layer for clinic chat, typing and presence
//! indicators, and video-call signaling.
//!
//! ## Features
//!
//! - **One adapter per provider**: raw websocket or Pusher Channels behind
//!   a single `TransportAdapter` trait
//! - **Single-room occupancy**: joining a room leaves the previous one first
//! - **Automatic recovery**: exponential backoff after unexpected drops,
//!   rejoining the held room on success
//! - **Idle protection**: periodic liveness frames while connected
//! - **Deterministic teardown**: no callback or timer fires after `disconnect()`
//!
//! ## Example
//!
//! ```rust,ignore
//! use carelink::{ChannelHandler, ConnectionManager, MessageKind, RealtimeEvent};
//!
//! #[tokio::main]
//! async fn main() -> carelink::Result<()> {
//!     let (handler, events) = ChannelHandler::new();
//!     let manager = ConnectionManager::builder()
//!         .native_socket("wss://clinic.example/ws")
//!         .handler(handler)
//!         .build()?;
//!
//!     manager.connect("doc-1", "Dr. Okafor").await?;
//!     manager.join_room("clinic-42").await?;
//!     manager.send_message("The patient is ready", MessageKind::Text).await?;
//!
//!     while let Ok(event) = events.recv_event() {
//!         if let RealtimeEvent::Message(message) = event {
//!             println!("{}: {}", message.sender_name, message.content);
//!         }
//!     }
//!
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod manager;
pub mod protocol;
pub mod traits;
pub mod transport;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    builder, config, connection_state, heartbeat,
    builder::{states, ManagerBuilder},
    config::{PusherAuthConfig, PusherConfig, ProviderConfig, RealtimeConfig, ReconnectConfig},
    connection_state::{ConnectionState, Metrics},
};

pub use protocol::{ChatMessage, Envelope, Identity, MessageKind, RoomMember, TypingIndicator};
pub use transport::{build_adapter, NativeSocketAdapter, PusherAdapter};

// Re-export manager
pub use manager::ConnectionManager;
