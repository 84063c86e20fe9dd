pub mod states;

use crate::core::config::{ManagerConfig, ProviderConfig, PusherConfig};
use crate::core::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::manager::ConnectionManager;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for `ConnectionManager`
///
/// The type system enforces that a transport (a provider configuration or
/// a custom adapter) is chosen before the manager can be built. Everything
/// else has a default:
///
/// - handler: [`NoOpHandler`]
/// - heartbeat: every 30 seconds
/// - reconnect: [`ExponentialBackoff::default`] (1s base, 5 attempts)
pub struct ManagerBuilder<P>
where
    P: ProviderState,
{
    _state: TypeState<P>,
    provider: Option<ProviderConfig>,
    transport: Option<Box<dyn TransportAdapter>>,
    handler: Option<Arc<dyn RealtimeHandler>>,
    heartbeat_interval: Duration,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ManagerBuilder<NoProvider> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            provider: None,
            transport: None,
            handler: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_strategy: None,
        }
    }
}

impl Default for ManagerBuilder<NoProvider> {
    fn default() -> Self {
        Self::new()
    }
}

// Transport selection
impl ManagerBuilder<NoProvider> {
    fn with_transport(
        self,
        provider: Option<ProviderConfig>,
        transport: Option<Box<dyn TransportAdapter>>,
    ) -> ManagerBuilder<HasProvider> {
        ManagerBuilder {
            _state: TypeState::new(),
            provider,
            transport,
            handler: self.handler,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_strategy: self.reconnect_strategy,
        }
    }

    pub fn provider(self, provider: ProviderConfig) -> ManagerBuilder<HasProvider> {
        self.with_transport(Some(provider), None)
    }

    /// Raw websocket at `url` (ws:// or wss://)
    pub fn native_socket(self, url: impl Into<String>) -> ManagerBuilder<HasProvider> {
        self.provider(ProviderConfig::NativeSocket { url: url.into() })
    }

    pub fn pusher(self, config: PusherConfig) -> ManagerBuilder<HasProvider> {
        self.provider(ProviderConfig::Pusher(config))
    }

    /// Use a caller-supplied adapter instead of a built-in provider
    ///
    /// The adapter is owned exclusively by the manager being built.
    pub fn transport(self, adapter: impl TransportAdapter + 'static) -> ManagerBuilder<HasProvider> {
        self.with_transport(None, Some(Box::new(adapter)))
    }
}

// Optional configuration methods
impl<P> ManagerBuilder<P>
where
    P: ProviderState,
{
    pub fn handler(mut self, handler: impl RealtimeHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Share a handler that is also held elsewhere
    pub fn shared_handler(mut self, handler: Arc<dyn RealtimeHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }
}

// Build method - only available once a transport is chosen
impl ManagerBuilder<HasProvider> {
    pub fn build(self) -> Result<ConnectionManager> {
        if self.heartbeat_interval.is_zero() {
            return Err(RealtimeError::Configuration(
                "heartbeat interval must be greater than 0".to_string(),
            ));
        }

        if let Some(ProviderConfig::NativeSocket { url }) = &self.provider {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(RealtimeError::Configuration(format!(
                    "native socket url must be ws:// or wss://, got '{}'",
                    url
                )));
            }
        }

        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(ExponentialBackoff::default()));
        let handler = self.handler.unwrap_or_else(|| Arc::new(NoOpHandler));

        let config = ManagerConfig {
            provider: self.provider,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_strategy,
        };

        Ok(ConnectionManager::new(config, handler, self.transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection_state::ConnectionState;

    #[test]
    fn test_defaults() {
        let manager = ManagerBuilder::new()
            .native_socket("ws://localhost:3001")
            .build()
            .unwrap();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.config().heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(manager.config().max_reconnect_attempts(), 5);
        assert!(manager.current_room().is_none());
        assert!(manager.user().is_none());
    }

    #[test]
    fn test_rejects_zero_heartbeat() {
        let result = ManagerBuilder::new()
            .native_socket("ws://localhost:3001")
            .heartbeat_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(RealtimeError::Configuration(_))));
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let result = ManagerBuilder::new().native_socket("http://localhost:3001").build();
        assert!(matches!(result, Err(RealtimeError::Configuration(_))));
    }

    #[test]
    fn test_custom_strategy_is_used() {
        let manager = ManagerBuilder::new()
            .pusher(PusherConfig::new("key"))
            .reconnect_strategy(NeverReconnect)
            .build()
            .unwrap();
        assert_eq!(manager.config().max_reconnect_attempts(), 0);
    }
}
