//! Managed pub/sub adapter speaking the Pusher Channels protocol (v7)
//!
//! Provider events are normalized into envelopes:
//!
//! | provider event                              | envelope       |
//! |---------------------------------------------|----------------|
//! | `client-message`                            | `message`      |
//! | `client-typing`                             | `typing`       |
//! | `pusher_internal:subscription_succeeded`    | `user-joined`* |
//! | `pusher_internal:member_added`              | `user-joined`  |
//! | `pusher_internal:member_removed`            | `user-left`    |
//! | `pusher:error` (4000-4199)                  | transport error|
//!
//! (*) one per member already present, presence channels only.
//!
//! Server `pusher:ping` frames are answered with `pusher:pong` inside the
//! socket task and never reach the manager.

use super::socket::{FrameDecoder, SocketLink, WsStream};
use crate::core::config::PusherConfig;
use crate::protocol::{Envelope, Identity, RoomMember};
use crate::traits::*;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: u8 = 7;
const CLIENT_NAME: &str = "carelink-rs";
const PRESENCE_PREFIX: &str = "presence-";
const PONG: &str = r#"{"event":"pusher:pong","data":{}}"#;

/// Raw provider frame; `data` is frequently a JSON-encoded string
#[derive(Debug, Deserialize)]
struct PusherEvent {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

impl PusherEvent {
    fn payload(&self) -> Value {
        match &self.data {
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| self.data.clone()),
            other => other.clone(),
        }
    }
}

/// Maps provider channel names back to room ids
#[derive(Debug, Clone)]
pub(crate) struct ChannelNaming {
    prefix: String,
    presence: bool,
}

impl ChannelNaming {
    fn channel(&self, room_id: &str) -> String {
        if self.presence {
            format!("{}{}{}", PRESENCE_PREFIX, self.prefix, room_id)
        } else {
            format!("{}{}", self.prefix, room_id)
        }
    }

    fn room(&self, channel: &str) -> Option<String> {
        let channel = channel.strip_prefix(PRESENCE_PREFIX).unwrap_or(channel);
        channel.strip_prefix(&self.prefix).map(str::to_string)
    }
}

pub(crate) struct PusherDecoder {
    naming: ChannelNaming,
}

impl PusherDecoder {
    fn member(room_id: &str, payload: &Value) -> Option<RoomMember> {
        let user_id = match payload.get("user_id")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let user_name = payload
            .pointer("/user_info/name")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(RoomMember {
            room_id: room_id.to_string(),
            user_id,
            user_name,
        })
    }

    fn existing_members(room_id: &str, payload: &Value) -> Vec<RoomMember> {
        let Some(hash) = payload.pointer("/presence/hash").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut members: Vec<RoomMember> = hash
            .iter()
            .map(|(user_id, info)| RoomMember {
                room_id: room_id.to_string(),
                user_id: user_id.clone(),
                user_name: info.get("name").and_then(Value::as_str).map(str::to_string),
            })
            .collect();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        members
    }

    fn frame<T: serde::de::DeserializeOwned>(payload: Value, wrap: fn(T) -> Envelope) -> Vec<TransportSignal> {
        match serde_json::from_value(payload) {
            Ok(value) => vec![TransportSignal::Frame(wrap(value))],
            Err(e) => {
                warn!("Dropping malformed client event: {}", e);
                Vec::new()
            }
        }
    }
}

impl FrameDecoder for PusherDecoder {
    fn decode(&self, text: &str) -> Vec<TransportSignal> {
        let event: PusherEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed provider frame: {}", e);
                return Vec::new();
            }
        };
        let payload = event.payload();

        if event.event == "pusher:error" {
            let code = payload.get("code").and_then(Value::as_u64).unwrap_or(0);
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error");
            // 4000-4199: the provider is about to close the connection
            if (4000..4200).contains(&code) {
                return vec![TransportSignal::Error(format!("pusher error {}: {}", code, message))];
            }
            warn!("Provider reported error {}: {}", code, message);
            return Vec::new();
        }

        let Some(room_id) = event.channel.as_deref().and_then(|c| self.naming.room(c)) else {
            debug!("Ignoring provider event '{}' outside any room channel", event.event);
            return Vec::new();
        };

        match event.event.as_str() {
            "client-message" => Self::frame(payload, Envelope::Message),
            "client-typing" => Self::frame(payload, Envelope::Typing),
            "pusher_internal:member_added" => Self::member(&room_id, &payload)
                .map(|m| vec![TransportSignal::Frame(Envelope::UserJoined(m))])
                .unwrap_or_default(),
            "pusher_internal:member_removed" => Self::member(&room_id, &payload)
                .map(|m| vec![TransportSignal::Frame(Envelope::UserLeft(m))])
                .unwrap_or_default(),
            "pusher_internal:subscription_succeeded" => {
                debug!("Subscribed to room {}", room_id);
                Self::existing_members(&room_id, &payload)
                    .into_iter()
                    .map(|m| TransportSignal::Frame(Envelope::UserJoined(m)))
                    .collect()
            }
            "pusher:subscription_error" => {
                warn!("Subscription to room {} rejected: {}", room_id, payload);
                Vec::new()
            }
            other => {
                warn!("Dropping provider event with unknown type: {}", other);
                Vec::new()
            }
        }
    }
}

pub struct PusherAdapter {
    config: PusherConfig,
    naming: ChannelNaming,
    authorizer: Option<Arc<dyn ChannelAuthorizer>>,
    socket_id: Option<String>,
    link: Option<SocketLink>,
}

impl PusherAdapter {
    /// Create the adapter; fails if the app key is missing
    pub fn new(config: PusherConfig, authorizer: Option<Arc<dyn ChannelAuthorizer>>) -> Result<Self> {
        if config.app_key.trim().is_empty() {
            return Err(RealtimeError::Connect(
                "pusher provider requires an app_key".to_string(),
            ));
        }
        let naming = ChannelNaming {
            prefix: config.channel_prefix.clone(),
            presence: authorizer.is_some(),
        };
        Ok(Self {
            config,
            naming,
            authorizer,
            socket_id: None,
            link: None,
        })
    }

    /// Websocket endpoint for the configured app
    pub fn endpoint(&self) -> String {
        let host = match (&self.config.host, &self.config.cluster) {
            (Some(host), _) => host.clone(),
            (None, Some(cluster)) => format!("ws-{}.pusher.com", cluster),
            (None, None) => "ws.pusherapp.com".to_string(),
        };
        let scheme = if self.config.use_tls { "wss" } else { "ws" };
        format!(
            "{}://{}/app/{}?protocol={}&client={}&version={}&flash=false",
            scheme,
            host,
            self.config.app_key,
            PROTOCOL_VERSION,
            CLIENT_NAME,
            env!("CARGO_PKG_VERSION")
        )
    }

    /// Provider channel carrying `room_id`
    pub fn channel_for(&self, room_id: &str) -> String {
        self.naming.channel(room_id)
    }

    pub fn socket_id(&self) -> Option<&str> {
        self.socket_id.as_deref()
    }

    fn push(&self, event: Value) -> Result<()> {
        let link = self
            .link
            .as_ref()
            .ok_or(RealtimeError::Send(SendError::NotConnected))?;
        link.send_text(event.to_string())
    }
}

/// Read frames until the provider confirms the connection
async fn wait_for_established(stream: &mut WsStream) -> Result<(String, Option<u64>)> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| RealtimeError::Connect(e.to_string()))?;
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(event) = serde_json::from_str::<PusherEvent>(&text) else {
            warn!("Ignoring malformed frame before connection_established");
            continue;
        };
        let payload = event.payload();
        match event.event.as_str() {
            "pusher:connection_established" => {
                let socket_id = payload
                    .get("socket_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RealtimeError::Connect("connection_established without socket_id".into()))?;
                let activity_timeout = payload.get("activity_timeout").and_then(Value::as_u64);
                return Ok((socket_id.to_string(), activity_timeout));
            }
            "pusher:error" => {
                return Err(RealtimeError::Connect(format!("provider rejected connection: {}", payload)));
            }
            other => debug!("Ignoring '{}' before connection_established", other),
        }
    }
    Err(RealtimeError::Connect(
        "connection closed before connection_established".to_string(),
    ))
}

#[async_trait]
impl TransportAdapter for PusherAdapter {
    fn provider(&self) -> Provider {
        Provider::Pusher
    }

    async fn open(&mut self, identity: &Identity, signals: SignalSender) -> Result<()> {
        if let Some(stale) = self.link.take() {
            stale.close().await;
        }
        self.socket_id = None;

        let url = self.endpoint();
        let mut stream = SocketLink::connect(&url).await?;
        let (socket_id, activity_timeout) = wait_for_established(&mut stream).await?;
        info!(
            "Pusher connection established for {} (socket {}, activity timeout {:?}s)",
            identity.user_id, socket_id, activity_timeout
        );

        let decoder = Arc::new(PusherDecoder {
            naming: self.naming.clone(),
        });
        let ping: Arc<dyn PassivePingDetector> = Arc::new(JsonPassivePing::new("event", "pusher:ping", PONG));

        self.socket_id = Some(socket_id);
        self.link = Some(SocketLink::spawn(stream, decoder, Some(ping), signals.clone()));
        let _ = signals.send(TransportSignal::Opened);
        Ok(())
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let event = match envelope {
            Envelope::Message(message) => json!({
                "event": "client-message",
                "channel": self.naming.channel(&message.room_id),
                "data": message,
            }),
            Envelope::Typing(indicator) => json!({
                "event": "client-typing",
                "channel": self.naming.channel(&indicator.room_id),
                "data": indicator,
            }),
            Envelope::Ping => json!({ "event": "pusher:ping", "data": {} }),
            other => {
                // Membership is provider-native on this transport
                debug!("Not forwarding '{}' frame to pusher", other.kind());
                return Ok(());
            }
        };
        self.push(event)
    }

    async fn subscribe(&mut self, room_id: &str, identity: &Identity) -> Result<()> {
        let channel = self.naming.channel(room_id);
        let mut data = json!({ "channel": channel });

        if let Some(authorizer) = &self.authorizer {
            let socket_id = self
                .socket_id
                .as_deref()
                .ok_or(RealtimeError::Send(SendError::NotConnected))?;
            let auth = authorizer.authorize(socket_id, &channel, identity).await?;
            data["auth"] = Value::String(auth.auth);
            if let Some(channel_data) = auth.channel_data {
                data["channel_data"] = Value::String(channel_data);
            }
        }

        debug!("Subscribing to {}", channel);
        self.push(json!({ "event": "pusher:subscribe", "data": data }))
    }

    async fn unsubscribe(&mut self, room_id: &str, _identity: &Identity) -> Result<()> {
        let channel = self.naming.channel(room_id);
        debug!("Unsubscribing from {}", channel);
        self.push(json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }))
    }

    async fn close(&mut self) {
        self.socket_id = None;
        if let Some(link) = self.link.take() {
            link.close().await;
        }
    }
}
