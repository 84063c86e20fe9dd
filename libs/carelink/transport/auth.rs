//! Presence channel authorizers for the Pusher adapter

use crate::protocol::Identity;
use crate::traits::*;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Presence member record in the provider's format
pub fn presence_channel_data(identity: &Identity) -> String {
    serde_json::json!({
        "user_id": identity.user_id,
        "user_info": { "name": identity.user_name },
    })
    .to_string()
}

/// Obtains signatures from the application's auth route
///
/// Sends `socket_id`, `channel_name`, `user_id` and `user_name` as a form
/// POST and expects `{"auth": "...", "channel_data": "..."}` back.
pub struct EndpointAuthorizer {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
}

impl EndpointAuthorizer {
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers,
        }
    }
}

#[async_trait]
impl ChannelAuthorizer for EndpointAuthorizer {
    async fn authorize(
        &self,
        socket_id: &str,
        channel_name: &str,
        identity: &Identity,
    ) -> Result<ChannelAuth> {
        debug!("Requesting channel auth for {} from {}", channel_name, self.url);

        let mut request = self.client.post(&self.url).form(&[
            ("socket_id", socket_id),
            ("channel_name", channel_name),
            ("user_id", identity.user_id.as_str()),
            ("user_name", identity.user_name.as_str()),
        ]);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RealtimeError::Transport(format!("channel auth request failed: {}", e)))?;

        response
            .json::<ChannelAuth>()
            .await
            .map_err(|e| RealtimeError::Protocol(format!("bad channel auth response: {}", e)))
    }
}

/// Signs subscriptions locally with the application secret
///
/// Only for development and tests: the secret must never ship to clients.
pub struct SecretAuthorizer {
    app_key: String,
    secret: String,
}

impl SecretAuthorizer {
    pub fn new(app_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            secret: secret.into(),
        }
    }

    /// `<app_key>:hex(HMAC-SHA256(secret, socket_id:channel[:channel_data]))`
    pub fn sign(&self, socket_id: &str, channel_name: &str, channel_data: Option<&str>) -> Result<String> {
        let mut payload = format!("{}:{}", socket_id, channel_name);
        if let Some(data) = channel_data {
            payload.push(':');
            payload.push_str(data);
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| RealtimeError::Configuration(format!("invalid pusher secret: {}", e)))?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}:{}", self.app_key, hex::encode(signature)))
    }
}

#[async_trait]
impl ChannelAuthorizer for SecretAuthorizer {
    async fn authorize(
        &self,
        socket_id: &str,
        channel_name: &str,
        identity: &Identity,
    ) -> Result<ChannelAuth> {
        let channel_data = channel_name
            .starts_with("presence-")
            .then(|| presence_channel_data(identity));
        let auth = self.sign(socket_id, channel_name, channel_data.as_deref())?;
        Ok(ChannelAuth { auth, channel_data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matches_reference_vector() {
        // Reference values from the Pusher channel authorization docs
        let authorizer = SecretAuthorizer::new("278d425bdf160c739803", "7ad3773142a6692b25b8");
        let auth = authorizer
            .sign("1234.1234", "private-foobar", None)
            .unwrap();
        assert_eq!(
            auth,
            "278d425bdf160c739803:58df8b0c36d6982b82c3ecf6b4662e34fe8c25bba48f5369f135bf843651c3a4"
        );
    }

    #[tokio::test]
    async fn test_presence_channels_carry_member_data() {
        let authorizer = SecretAuthorizer::new("key", "secret");
        let identity = Identity::new("doc-1", "Dr. Okafor");

        let auth = authorizer
            .authorize("1.2", "presence-room-clinic-42", &identity)
            .await
            .unwrap();
        let data: serde_json::Value = serde_json::from_str(auth.channel_data.as_deref().unwrap()).unwrap();
        assert_eq!(data["user_id"], "doc-1");
        assert_eq!(data["user_info"]["name"], "Dr. Okafor");
        assert!(auth.auth.starts_with("key:"));

        let public = authorizer.authorize("1.2", "private-x", &identity).await.unwrap();
        assert!(public.channel_data.is_none());
    }
}
