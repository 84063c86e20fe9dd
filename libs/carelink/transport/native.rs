//! Raw websocket adapter
//!
//! Envelopes travel as JSON text frames in both directions. Room
//! membership is announced with `join-room` / `leave-room`; the server
//! fans out `user-joined` / `user-left` to the other occupants.

use super::socket::{FrameDecoder, SocketLink};
use crate::protocol::{Envelope, Identity};
use crate::traits::*;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Decodes envelope JSON, dropping anything malformed or unknown
pub(crate) struct EnvelopeDecoder;

impl FrameDecoder for EnvelopeDecoder {
    fn decode(&self, text: &str) -> Vec<TransportSignal> {
        match Envelope::decode(text) {
            Ok(Some(envelope)) => vec![TransportSignal::Frame(envelope)],
            Ok(None) => {
                warn!("Dropping frame with unknown type: {}", text);
                Vec::new()
            }
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                Vec::new()
            }
        }
    }
}

pub struct NativeSocketAdapter {
    url: String,
    link: Option<SocketLink>,
}

impl NativeSocketAdapter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            link: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn link(&self) -> Result<&SocketLink> {
        self.link
            .as_ref()
            .ok_or_else(|| SendError::NotConnected.into())
    }
}

#[async_trait]
impl TransportAdapter for NativeSocketAdapter {
    fn provider(&self) -> Provider {
        Provider::NativeSocket
    }

    async fn open(&mut self, identity: &Identity, signals: SignalSender) -> Result<()> {
        if let Some(stale) = self.link.take() {
            stale.close().await;
        }

        let stream = SocketLink::connect(&self.url).await?;
        info!("Connected to {} as {}", self.url, identity.user_id);

        self.link = Some(SocketLink::spawn(
            stream,
            Arc::new(EnvelopeDecoder),
            None,
            signals.clone(),
        ));
        let _ = signals.send(TransportSignal::Opened);
        Ok(())
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let text = envelope.encode()?;
        self.link()?.send_text(text)
    }

    async fn subscribe(&mut self, room_id: &str, identity: &Identity) -> Result<()> {
        self.send(&Envelope::JoinRoom(identity.member_of(room_id))).await
    }

    async fn unsubscribe(&mut self, room_id: &str, identity: &Identity) -> Result<()> {
        self.send(&Envelope::LeaveRoom(identity.member_of(room_id))).await
    }

    async fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.close().await;
        }
    }
}
