//! Common test utilities for Carelink integration tests
//!
//! - `FakeTransport`: scripted adapter; tests inject frames, drop the link
//!   and fail opens through its `FakeControl`
//! - `MockWsServer`: echoing websocket server on `127.0.0.1:0`
//! - `MockPusherServer`: speaks enough of the Pusher Channels protocol to
//!   drive `PusherAdapter` end to end
//! - event helpers for `ChannelHandler` streams

#![allow(dead_code)]

use async_trait::async_trait;
use carelink::protocol::{ChatMessage, Envelope, Identity, MessageKind, RoomMember};
use carelink::traits::*;
use carelink::PusherConfig;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

#[derive(Default)]
struct FakeState {
    signals: Option<SignalSender>,
    sent: Vec<Envelope>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
    open_times: Vec<Instant>,
    closes: u32,
    failing_opens: u32,
    fail_all_opens: bool,
    hold_opens: bool,
    fail_subscribes: bool,
    reject_handshake: Option<String>,
    echo: bool,
    dropped_at: Option<Instant>,
}

/// Test-side handle onto a `FakeTransport`
#[derive(Clone, Default)]
pub struct FakeControl {
    state: Arc<Mutex<FakeState>>,
}

/// Adapter whose network is the test itself
pub struct FakeTransport {
    control: FakeControl,
}

impl FakeTransport {
    pub fn new() -> (Self, FakeControl) {
        let control = FakeControl::default();
        (
            Self {
                control: control.clone(),
            },
            control,
        )
    }
}

#[async_trait]
impl TransportAdapter for FakeTransport {
    fn provider(&self) -> Provider {
        Provider::Custom
    }

    async fn open(&mut self, _identity: &Identity, signals: SignalSender) -> Result<()> {
        let (hold, rejection) = {
            let mut state = self.control.state.lock();
            state.open_times.push(Instant::now());
            if state.fail_all_opens || state.failing_opens > 0 {
                state.failing_opens = state.failing_opens.saturating_sub(1);
                return Err(RealtimeError::Connect("scripted open failure".into()));
            }
            (state.hold_opens, state.reject_handshake.clone())
        };

        if hold {
            std::future::pending::<()>().await;
        }

        match rejection {
            Some(reason) => {
                let _ = signals.send(TransportSignal::Error(reason));
            }
            None => {
                let _ = signals.send(TransportSignal::Opened);
            }
        }
        self.control.state.lock().signals = Some(signals);
        Ok(())
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let mut state = self.control.state.lock();
        let Some(signals) = state.signals.clone() else {
            return Err(SendError::Closed("fake link is down".into()).into());
        };
        state.sent.push(envelope.clone());
        if state.echo && matches!(envelope, Envelope::Message(_)) {
            let _ = signals.send(TransportSignal::Frame(envelope.clone()));
        }
        Ok(())
    }

    async fn subscribe(&mut self, room_id: &str, _identity: &Identity) -> Result<()> {
        let mut state = self.control.state.lock();
        if state.fail_subscribes {
            return Err(RealtimeError::Transport("channel auth request failed".into()));
        }
        state.subscribed.push(room_id.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, room_id: &str, _identity: &Identity) -> Result<()> {
        self.control.state.lock().unsubscribed.push(room_id.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.control.state.lock();
        state.closes += 1;
        state.signals = None;
    }
}

impl FakeControl {
    /// Deliver an inbound frame as if it came from the network
    pub fn inject(&self, envelope: Envelope) {
        let state = self.state.lock();
        let signals = state.signals.as_ref().expect("fake link is not open");
        signals.send(TransportSignal::Frame(envelope)).unwrap();
    }

    /// Simulate the link dying underneath the manager
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.dropped_at = Some(Instant::now());
        if let Some(signals) = state.signals.take() {
            let _ = signals.send(TransportSignal::Closed(Some("connection reset".into())));
        }
    }

    /// Report an adapter-level error on the open link
    pub fn fail_link(&self, reason: &str) {
        let state = self.state.lock();
        if let Some(signals) = &state.signals {
            let _ = signals.send(TransportSignal::Error(reason.to_string()));
        }
    }

    pub fn fail_next_opens(&self, count: u32) {
        self.state.lock().failing_opens = count;
    }

    pub fn fail_all_opens(&self, fail: bool) {
        self.state.lock().fail_all_opens = fail;
    }

    /// Make `open` hang until the caller gives up on it
    pub fn hold_opens(&self, hold: bool) {
        self.state.lock().hold_opens = hold;
    }

    /// Accept the socket but fail the provider handshake with `reason`
    pub fn reject_handshake(&self, reason: Option<&str>) {
        self.state.lock().reject_handshake = reason.map(str::to_string);
    }

    /// Reject every subscribe, as a failed channel authorization would
    pub fn fail_subscribes(&self, fail: bool) {
        self.state.lock().fail_subscribes = fail;
    }

    /// Loop outgoing messages straight back in
    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.state.lock().sent.clone()
    }

    pub fn sent_messages(&self) -> Vec<ChatMessage> {
        self.sent()
            .into_iter()
            .filter_map(|e| match e {
                Envelope::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.sent().iter().filter(|e| matches!(e, Envelope::Ping)).count()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.state.lock().subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.state.lock().unsubscribed.clone()
    }

    pub fn opens(&self) -> usize {
        self.state.lock().open_times.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().open_times.clone()
    }

    pub fn dropped_at(&self) -> Option<Instant> {
        self.state.lock().dropped_at
    }

    pub fn closes(&self) -> u32 {
        self.state.lock().closes
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().signals.is_some()
    }
}

/// Chat message from another participant
pub fn message_from(user: &str, room: &str, content: &str) -> Envelope {
    let sender = Identity::new(user, format!("{} name", user));
    Envelope::Message(ChatMessage::new(MessageKind::Text, content, &sender, room))
}

pub fn member(user: &str, room: &str) -> RoomMember {
    RoomMember {
        room_id: room.to_string(),
        user_id: user.to_string(),
        user_name: Some(format!("{} name", user)),
    }
}

/// Give the driver task a chance to process what is queued
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Wait for the next event (virtual time under `start_paused`)
pub async fn next_event(events: &EventStream) -> RealtimeEvent {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            if let Some(event) = events.try_recv_event() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("timed out waiting for an event")
}

/// Poll `condition` until it holds
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {}", what);
}

/// Skip events until one matches
pub async fn wait_for(events: &EventStream, matches: impl Fn(&RealtimeEvent) -> bool) -> RealtimeEvent {
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
        verbose_println!("  skipping {:?}", event);
    }
}

/// A simple echoing WebSocket server for testing
///
/// Every text frame is recorded and echoed back. `kick()` closes all open
/// connections while continuing to accept new ones.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    kick: Arc<Notify>,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let kick = Arc::new(Notify::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));

        let server = Self {
            addr,
            shutdown: Arc::clone(&shutdown),
            kick: Arc::clone(&kick),
            received: Arc::clone(&received),
            connections: Arc::clone(&connections),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                *connections.lock() += 1;
                                let shutdown = Arc::clone(&shutdown);
                                let kick = Arc::clone(&kick);
                                let received = Arc::clone(&received);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown, kick, received).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        server
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        shutdown: Arc<Notify>,
        kick: Arc<Notify>,
        received: Arc<Mutex<Vec<String>>>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            received.lock().push(text.clone());
                            // Echo the message back
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                _ = kick.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Text frames received so far, across all connections
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> u32 {
        *self.connections.lock()
    }

    /// Close every open connection from the server side
    pub fn kick(&self) {
        self.kick.notify_waiters();
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Socket id handed out in `pusher:connection_established`
pub const PUSHER_SOCKET_ID: &str = "123.456";

/// A Pusher Channels server stand-in
///
/// - greets with `pusher:connection_established` (or a `pusher:error`)
/// - answers `pusher:subscribe` with `subscription_succeeded`; presence
///   channels also get a member list and a `member_added`
/// - relays `client-*` events back, as another subscriber would see them
/// - records every frame and the request path of each connection
pub struct MockPusherServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    push: broadcast::Sender<String>,
    received: Arc<Mutex<Vec<Value>>>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl MockPusherServer {
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Reject every connection with `pusher:error` before establishing it
    pub async fn start_rejecting(code: u16, message: &str) -> Self {
        Self::spawn(Some((code, message.to_string()))).await
    }

    async fn spawn(rejection: Option<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let (push, _) = broadcast::channel(16);
        let received = Arc::new(Mutex::new(Vec::new()));
        let paths = Arc::new(Mutex::new(Vec::new()));

        let server = Self {
            addr,
            shutdown: Arc::clone(&shutdown),
            push: push.clone(),
            received: Arc::clone(&received),
            paths: Arc::clone(&paths),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let connection = PusherConnection {
                            shutdown: Arc::clone(&shutdown),
                            pushes: push.subscribe(),
                            received: Arc::clone(&received),
                            paths: Arc::clone(&paths),
                            rejection: rejection.clone(),
                        };
                        tokio::spawn(connection.run(stream));
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });

        server
    }

    /// Adapter settings pointing at this server
    pub fn config(&self, app_key: &str) -> PusherConfig {
        let mut config = PusherConfig::new(app_key);
        config.host = Some(self.addr.to_string());
        config.use_tls = false;
        config
    }

    /// Send the provider's data-level ping to every connection
    pub fn send_ping(&self) {
        let _ = self.push.send(json!({ "event": "pusher:ping", "data": {} }).to_string());
    }

    /// Frames received so far, parsed
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Received frames whose `event` is `name`
    pub fn received_events(&self, name: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|frame| frame["event"] == name)
            .collect()
    }

    /// Request URI of each accepted connection
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockPusherServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PusherConnection {
    shutdown: Arc<Notify>,
    pushes: broadcast::Receiver<String>,
    received: Arc<Mutex<Vec<Value>>>,
    paths: Arc<Mutex<Vec<String>>>,
    rejection: Option<(u16, String)>,
}

impl PusherConnection {
    async fn run(mut self, stream: tokio::net::TcpStream) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_hdr_async;
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
        use tokio_tungstenite::tungstenite::Message;

        let paths = Arc::clone(&self.paths);
        let record_path = move |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            paths.lock().push(request.uri().to_string());
            Ok(response)
        };
        let Ok(ws_stream) = accept_hdr_async(stream, record_path).await else {
            return;
        };
        let (mut write, mut read) = ws_stream.split();

        if let Some((code, message)) = &self.rejection {
            let error = json!({ "event": "pusher:error", "data": { "code": code, "message": message } });
            let _ = write.send(Message::Text(error.to_string())).await;
            let _ = write.send(Message::Close(None)).await;
            return;
        }

        // Pusher encodes event data as a JSON string
        let established = json!({
            "event": "pusher:connection_established",
            "data": json!({ "socket_id": PUSHER_SOCKET_ID, "activity_timeout": 120 }).to_string(),
        });
        if write.send(Message::Text(established.to_string())).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(frame) = serde_json::from_str::<Value>(&text) else { continue };
                            self.received.lock().push(frame.clone());
                            for reply in Self::replies(&frame) {
                                if write.send(Message::Text(reply)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                push = self.pushes.recv() => {
                    match push {
                        Ok(text) => {
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = self.shutdown.notified() => break,
            }
        }
    }

    fn replies(frame: &Value) -> Vec<String> {
        match frame["event"].as_str() {
            Some("pusher:subscribe") => {
                let channel = frame["data"]["channel"].as_str().unwrap_or_default();
                if !channel.starts_with("presence-") {
                    return vec![json!({
                        "event": "pusher_internal:subscription_succeeded",
                        "channel": channel,
                        "data": "{}",
                    })
                    .to_string()];
                }
                let presence = json!({
                    "presence": {
                        "count": 2,
                        "ids": ["doc-1", "pat-7"],
                        "hash": { "doc-1": { "name": "Dr. Okafor" }, "pat-7": { "name": "Pat" } },
                    }
                });
                let added = json!({ "user_id": "pat-9", "user_info": { "name": "Sam" } });
                vec![
                    json!({
                        "event": "pusher_internal:subscription_succeeded",
                        "channel": channel,
                        "data": presence.to_string(),
                    })
                    .to_string(),
                    json!({
                        "event": "pusher_internal:member_added",
                        "channel": channel,
                        "data": added.to_string(),
                    })
                    .to_string(),
                ]
            }
            Some(event) if event.starts_with("client-") => vec![frame.to_string()],
            _ => Vec::new(),
        }
    }
}
