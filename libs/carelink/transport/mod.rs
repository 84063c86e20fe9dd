//! Concrete transport adapters
//!
//! [`build_adapter`] is the only place that branches on the configured
//! provider; everything above it speaks `TransportAdapter`.

pub mod auth;
pub mod native;
pub mod pusher;
mod socket;

pub use auth::{presence_channel_data, EndpointAuthorizer, SecretAuthorizer};
pub use native::NativeSocketAdapter;
pub use pusher::PusherAdapter;

use crate::core::config::{ProviderConfig, PusherAuthConfig};
use crate::traits::*;
use std::sync::Arc;

/// Construct the adapter for a provider configuration
pub fn build_adapter(provider: &ProviderConfig) -> Result<Box<dyn TransportAdapter>> {
    match provider {
        ProviderConfig::NativeSocket { url } => Ok(Box::new(NativeSocketAdapter::new(url.clone()))),
        ProviderConfig::Pusher(config) => {
            let authorizer: Option<Arc<dyn ChannelAuthorizer>> = match &config.auth {
                None => None,
                Some(PusherAuthConfig::Endpoint { url, headers }) => {
                    Some(Arc::new(EndpointAuthorizer::new(url.clone(), headers.clone())))
                }
                Some(PusherAuthConfig::Secret { secret }) => {
                    Some(Arc::new(SecretAuthorizer::new(config.app_key.clone(), secret.clone())))
                }
            };
            Ok(Box::new(PusherAdapter::new(config.clone(), authorizer)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PusherConfig;

    #[test]
    fn test_build_adapter_per_provider() {
        let native = build_adapter(&ProviderConfig::NativeSocket {
            url: "ws://localhost:3001".into(),
        })
        .unwrap();
        assert_eq!(native.provider(), Provider::NativeSocket);

        let pusher = build_adapter(&ProviderConfig::Pusher(PusherConfig::new("key"))).unwrap();
        assert_eq!(pusher.provider(), Provider::Pusher);
    }

    #[test]
    fn test_pusher_without_key_fails_to_build() {
        let result = build_adapter(&ProviderConfig::Pusher(PusherConfig::new("")));
        assert!(matches!(result, Err(RealtimeError::Connect(_))));
    }
}
