//! Websocket I/O task shared by the socket-based adapters
//!
//! ```text
//!               ┌────────────── link task ──────────────┐
//! network ──────┼─> read ─> passive ping? ──yes──> pong ─┼──> network
//!               │                │no                     │
//!               │                └─> FrameDecoder ───────┼──> signals
//! adapter.send ─┼─> outbound queue ─> write ─────────────┼──> network
//!               └────────────────────────────────────────┘
//! ```
//!
//! The task reports `Closed` exactly once when the link fails. An explicit
//! `close()` ends the task without emitting anything.

use crate::traits::*;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close()` waits for the close handshake before aborting
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Translates inbound text frames into normalized signals
pub(crate) trait FrameDecoder: Send + Sync + 'static {
    fn decode(&self, text: &str) -> Vec<TransportSignal>;
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

pub(crate) struct SocketLink {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl SocketLink {
    /// Open the websocket; failures are connect errors
    pub async fn connect(url: &str) -> Result<WsStream> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Connect(format!("{}: {}", url, e)))?;
        debug!("Websocket handshake completed with {}", url);
        Ok(stream)
    }

    pub fn spawn(
        stream: WsStream,
        decoder: Arc<dyn FrameDecoder>,
        passive_ping: Option<Arc<dyn PassivePingDetector>>,
        signals: SignalSender,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(stream, decoder, passive_ping, signals, outbound_rx));
        Self { outbound, task }
    }

    /// Queue a text frame for transmission
    pub fn send_text(&self, text: String) -> Result<()> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| SendError::Closed("socket task has exited".into()).into())
    }

    /// Close the link and wait for the task to finish
    pub async fn close(self) {
        let _ = self.outbound.send(Outbound::Close);
        let mut task = self.task;
        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
            warn!("Socket task did not finish closing in {:?}, aborting", CLOSE_GRACE);
            task.abort();
        }
    }
}

async fn run_link(
    stream: WsStream,
    decoder: Arc<dyn FrameDecoder>,
    passive_ping: Option<Arc<dyn PassivePingDetector>>,
    signals: SignalSender,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let (mut write, mut read) = stream.split();

    let closed_reason = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(ref detector) = passive_ping {
                            if detector.is_ping(&text) {
                                debug!("Passive ping detected from server");
                                if let Err(e) = write.send(Message::Text(detector.pong_response())).await {
                                    let _ = signals.send(TransportSignal::Error(format!(
                                        "Failed to send passive pong: {}", e
                                    )));
                                    break Some(e.to_string());
                                }
                                continue;
                            }
                        }

                        for signal in decoder.decode(&text) {
                            // Receiver gone means the adapter was closed
                            if signals.send(signal).is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match String::from_utf8(data) {
                            Ok(text) => {
                                for signal in decoder.decode(&text) {
                                    if signals.send(signal).is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                        debug!("Server closed the websocket: {:?}", reason);
                        break reason;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong control frames are answered by tungstenite
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        let _ = signals.send(TransportSignal::Error(e.to_string()));
                        break Some(e.to_string());
                    }
                    None => {
                        warn!("WebSocket stream closed");
                        break Some("stream ended".to_string());
                    }
                }
            }

            cmd = outbound_rx.recv() => {
                match cmd {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            error!("WebSocket write failed: {}", e);
                            let _ = signals.send(TransportSignal::Error(e.to_string()));
                            break Some(e.to_string());
                        }
                    }
                    Some(Outbound::Close) | None => {
                        debug!("Closing websocket");
                        let _ = write.close().await;
                        return;
                    }
                }
            }
        }
    };

    let _ = signals.send(TransportSignal::Closed(closed_reason));
}
