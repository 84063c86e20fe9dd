use crate::protocol::Identity;
use crate::traits::error::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Signed subscription credentials for a private/presence channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelAuth {
    /// `<app_key>:<hex signature>`
    pub auth: String,
    /// Presence member record (`{"user_id":..,"user_info":{..}}`)
    #[serde(default)]
    pub channel_data: Option<String>,
}

/// Trait for authorizing presence channel subscriptions
///
/// Managed providers only deliver member events on authorized presence
/// channels. This is called on every subscribe, including the automatic
/// re-subscribe after a reconnect, because the socket id changes with each
/// connection.
///
/// Identity is taken as already established by the session system; the
/// authorizer only obtains the provider's signature for it.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    async fn authorize(
        &self,
        socket_id: &str,
        channel_name: &str,
        identity: &Identity,
    ) -> Result<ChannelAuth>;
}
