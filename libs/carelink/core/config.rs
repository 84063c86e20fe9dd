use crate::core::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::traits::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Which transport to use, and how to reach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProviderConfig {
    /// Raw websocket speaking the envelope protocol (ws:// or wss://)
    NativeSocket { url: String },
    /// Managed pub/sub over the Pusher Channels protocol
    Pusher(PusherConfig),
}

impl ProviderConfig {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderConfig::NativeSocket { .. } => Provider::NativeSocket,
            ProviderConfig::Pusher(_) => Provider::Pusher,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherConfig {
    /// Public application key; required
    #[serde(default)]
    pub app_key: String,

    /// Cluster name, e.g. `eu`; selects `ws-<cluster>.pusher.com`
    #[serde(default)]
    pub cluster: Option<String>,

    /// Full host override (`host[:port]`), e.g. a self-hosted compatible server
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_use_tls")]
    pub use_tls: bool,

    /// Prefix applied to room ids to derive channel names
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Presence channel authorization; without it public channels are used
    /// and no member events are delivered
    #[serde(default)]
    pub auth: Option<PusherAuthConfig>,
}

impl PusherConfig {
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            cluster: None,
            host: None,
            use_tls: default_use_tls(),
            channel_prefix: default_channel_prefix(),
            auth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PusherAuthConfig {
    /// POST to the application's auth route
    Endpoint {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Sign locally with the application secret (development only)
    Secret { secret: String },
}

fn default_use_tls() -> bool {
    true
}

fn default_channel_prefix() -> String {
    "room-".to_string()
}

/// Backoff settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_attempts,
        )
    }
}

fn default_base_delay_ms() -> u64 {
    ExponentialBackoff::DEFAULT_BASE_DELAY.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    ExponentialBackoff::DEFAULT_MAX_ATTEMPTS
}

fn default_max_delay_ms() -> u64 {
    ExponentialBackoff::DEFAULT_MAX_DELAY.as_millis() as u64
}

/// Serializable manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub provider: ProviderConfig,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}

impl RealtimeConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            heartbeat_interval_secs: default_heartbeat_secs(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Validate configuration values
    ///
    /// Missing provider credentials are deliberately not checked here; they
    /// surface as a `ConnectError` from `connect()`.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(RealtimeError::Configuration(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(RealtimeError::Configuration(
                "reconnect.base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(RealtimeError::Configuration(
                "reconnect.max_delay_ms must not be below base_delay_ms".to_string(),
            ));
        }

        if let ProviderConfig::NativeSocket { url } = &self.provider {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(RealtimeError::Configuration(format!(
                    "native socket url must be ws:// or wss://, got '{}'",
                    url
                )));
            }
        }

        Ok(())
    }
}

/// Resolved configuration handed to the driver
///
/// Built by `ManagerBuilder`; immutable for the life of the manager.
pub struct ManagerConfig {
    /// Provider to construct the adapter from; `None` when an adapter was
    /// injected directly
    pub(crate) provider: Option<ProviderConfig>,

    /// Interval between liveness frames while connected
    pub(crate) heartbeat_interval: Duration,

    /// Backoff applied after unexpected drops
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,
}

impl ManagerConfig {
    pub fn provider(&self) -> Option<&ProviderConfig> {
        self.provider.as_ref()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.reconnect_strategy.max_attempts()
    }
}

/// Shared handle to the resolved configuration
pub type SharedConfig = Arc<ManagerConfig>;
