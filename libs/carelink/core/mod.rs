//! Connection internals: state, timers, room registry, presence, routing
//! and the driver task behind `ConnectionManager`.

pub mod builder;
pub mod config;
pub mod connection_state;
pub(crate) mod driver;
pub mod heartbeat;
pub mod presence;
pub mod rooms;
pub mod router;

// Re-export main types
pub use builder::{states, ManagerBuilder};
pub use config::{
    ManagerConfig, ProviderConfig, PusherAuthConfig, PusherConfig, RealtimeConfig, ReconnectConfig,
    SharedConfig,
};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use heartbeat::{HeartbeatMonitor, DEFAULT_HEARTBEAT_INTERVAL};
pub use presence::PresenceTracker;
pub use rooms::{RoomChange, RoomRegistry};
pub use router::{Dispatch, DropReason, MessageRouter};
