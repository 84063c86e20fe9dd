//! Connection driver task
//!
//! One driver task runs per connected `ConnectionManager`. It exclusively
//! owns the transport adapter, the heartbeat timer and the reconnect timer,
//! so every timer lives and dies with the task:
//!
//! ```text
//!                 ┌──────────────────── driver task ────────────────────┐
//! manager ──cmd──>│ select! {                                           │
//!                 │   cancelled        => leave room, close, exit       │
//!                 │   adapter signal   => lifecycle / MessageRouter     │
//!                 │   command          => adapter.send / (un)subscribe  │
//!                 │   heartbeat tick   => adapter.send(ping)            │
//!                 │   reconnect timer  => adapter.open                  │
//!                 │ }                                                   │
//!                 └─────────────────────────────────────────────────────┘
//! ```
//!
//! Cancelling the token is the only way to stop a healthy driver. The task
//! returns the adapter so the manager can reuse it after a failed first
//! connect.

use crate::core::config::SharedConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::heartbeat::HeartbeatMonitor;
use crate::core::presence::PresenceTracker;
use crate::core::rooms::RoomRegistry;
use crate::core::router::{Dispatch, MessageRouter};
use crate::protocol::{Envelope, Identity};
use crate::traits::*;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) type Reply = oneshot::Sender<Result<()>>;

/// Requests from the manager handle
#[derive(Debug)]
pub(crate) enum Command {
    /// Transmit an envelope; `reply` is `None` for fire-and-forget sends
    Send {
        envelope: Envelope,
        reply: Option<Reply>,
    },
    Subscribe { room_id: String, reply: Reply },
    Unsubscribe { room_id: String, reply: Reply },
}

/// Shared pieces the driver operates on
pub(crate) struct DriverContext {
    pub config: SharedConfig,
    pub identity: Identity,
    pub state: Arc<AtomicConnectionState>,
    pub metrics: Arc<AtomicMetrics>,
    pub rooms: Arc<RoomRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub handler: Arc<dyn RealtimeHandler>,
    pub cancel: CancellationToken,
}

pub(crate) struct Driver {
    ctx: DriverContext,
    adapter: Box<dyn TransportAdapter>,
    router: MessageRouter,
    commands: mpsc::UnboundedReceiver<Command>,
    signals: Option<SignalReceiver>,
    heartbeat: HeartbeatMonitor,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    attempt: u32,
    connected: Option<Reply>,
}

/// Next signal from the active link; pending while there is none
async fn next_signal(signals: &mut Option<SignalReceiver>) -> Option<TransportSignal> {
    match signals {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

/// Resolve when the reconnect timer elapses; pending while unarmed
async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

impl Driver {
    pub fn new(
        ctx: DriverContext,
        adapter: Box<dyn TransportAdapter>,
        commands: mpsc::UnboundedReceiver<Command>,
        connected: Reply,
    ) -> Self {
        let router = MessageRouter::new(
            Arc::clone(&ctx.handler),
            Arc::clone(&ctx.rooms),
            Arc::clone(&ctx.presence),
        );
        let heartbeat = HeartbeatMonitor::new(ctx.config.heartbeat_interval());
        Self {
            ctx,
            adapter,
            router,
            commands,
            signals: None,
            heartbeat,
            reconnect_timer: None,
            attempt: 0,
            connected: Some(connected),
        }
    }

    /// Drive the connection until cancelled or reconnects are exhausted
    pub async fn run(mut self) -> Box<dyn TransportAdapter> {
        if !self.open_initial().await {
            return self.adapter;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.ctx.cancel.cancelled() => {
                    self.shutdown().await;
                    break;
                }

                signal = next_signal(&mut self.signals) => {
                    match signal {
                        Some(signal) => self.on_signal(signal).await,
                        None => {
                            self.signals = None;
                            self.on_link_lost("signal channel closed".to_string()).await;
                        }
                    }
                }

                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.on_command(cmd).await,
                        None => {
                            debug!("Manager handle dropped, shutting down driver");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                _ = self.heartbeat.tick() => self.send_heartbeat().await,

                _ = reconnect_due(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.attempt_reconnect().await;
                }
            }

            if self.is_exhausted() {
                break;
            }
        }

        info!("Connection driver for {} exiting", self.ctx.identity.user_id);
        self.adapter
    }

    fn is_exhausted(&self) -> bool {
        self.ctx.state.is_disconnected() && self.reconnect_timer.is_none() && self.signals.is_none()
    }

    /// First open; failures are reported once and never retried
    async fn open_initial(&mut self) -> bool {
        let (tx, rx) = mpsc::unbounded_channel();
        let result = tokio::select! {
            result = self.adapter.open(&self.ctx.identity, tx) => result,
            _ = self.ctx.cancel.cancelled() => Err(RealtimeError::Cancelled),
        };

        match result {
            Ok(()) => {
                self.signals = Some(rx);
                true
            }
            Err(e) => {
                self.adapter.close().await;
                self.ctx.state.set(ConnectionState::Disconnected);
                if !matches!(e, RealtimeError::Cancelled) {
                    error!("Failed to connect via {}: {}", self.adapter.provider(), e);
                    self.ctx.handler.on_error(e.clone());
                }
                self.resolve_connect(Err(e));
                false
            }
        }
    }

    fn resolve_connect(&mut self, result: Result<()>) {
        if let Some(reply) = self.connected.take() {
            let _ = reply.send(result);
        }
    }

    async fn on_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Opened => self.on_opened().await,
            TransportSignal::Frame(envelope) => {
                self.ctx.metrics.increment_received();
                if let Dispatch::Dropped(reason) = self.router.dispatch(envelope, &self.ctx.identity) {
                    debug!("Frame dropped: {:?}", reason);
                    self.ctx.metrics.increment_dropped();
                }
            }
            TransportSignal::Error(reason) => {
                warn!("Transport error: {}", reason);
                // Unacknowledged opens are reported by the connect or reconnect path
                if !self.ctx.state.is_connecting() {
                    self.ctx
                        .handler
                        .on_error(RealtimeError::Transport(reason.clone()));
                }
                self.on_link_lost(reason).await;
            }
            TransportSignal::Closed(reason) => {
                let reason = reason.unwrap_or_else(|| "closed by peer".to_string());
                self.on_link_lost(reason).await;
            }
        }
    }

    async fn on_opened(&mut self) {
        if self.ctx.state.is_connected() {
            debug!("Ignoring duplicate open signal");
            return;
        }

        let reconnected = self.ctx.state.get() == ConnectionState::Reconnecting;
        self.ctx.state.set(ConnectionState::Connected);
        self.attempt = 0;
        self.heartbeat.start();

        if reconnected {
            info!("Reconnected via {}", self.adapter.provider());
        } else {
            info!("Connected via {} as {}", self.adapter.provider(), self.ctx.identity.user_id);
        }
        self.ctx.handler.on_connect();
        self.resolve_connect(Ok(()));

        // Rejoin the room held before the drop
        if let Some(room_id) = self.ctx.rooms.current_room() {
            self.ctx.presence.reset(&room_id);
            if let Err(e) = self.adapter.subscribe(&room_id, &self.ctx.identity).await {
                warn!("Failed to rejoin room {}: {}", room_id, e);
                if self.ctx.rooms.leave_if(&room_id) {
                    self.ctx.presence.clear(&room_id);
                }
                self.ctx.handler.on_error(e);
            } else {
                info!("Rejoined room {}", room_id);
            }
        }
    }

    /// The active link failed; enter Reconnecting if it had been established
    async fn on_link_lost(&mut self, reason: String) {
        self.signals = None;
        match self.ctx.state.get() {
            ConnectionState::Connected => {}
            ConnectionState::Connecting => {
                // Closed before the provider acknowledged the first open
                let e = RealtimeError::Connect(reason);
                error!("Connection failed before it was established: {}", e);
                self.adapter.close().await;
                self.ctx.state.set(ConnectionState::Disconnected);
                self.ctx.handler.on_error(e.clone());
                self.resolve_connect(Err(e));
                return;
            }
            ConnectionState::Reconnecting => {
                debug!("Link lost before reconnect completed: {}", reason);
                self.adapter.close().await;
                if self.reconnect_timer.is_none() {
                    self.schedule_reconnect();
                }
                return;
            }
            ConnectionState::Disconnected => {
                self.adapter.close().await;
                return;
            }
        }

        warn!("Connection lost: {}", reason);
        self.heartbeat.stop();
        self.ctx.state.set(ConnectionState::Reconnecting);
        if let Some(room_id) = self.ctx.rooms.current_room() {
            self.ctx.presence.clear(&room_id);
        }
        self.ctx.handler.on_disconnect();
        self.adapter.close().await;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.attempt += 1;
        match self.ctx.config.reconnect_strategy.next_delay(self.attempt) {
            Some(delay) => {
                info!("Reconnecting in {:?} (attempt {})", delay, self.attempt);
                self.reconnect_timer = Some(Box::pin(sleep(delay)));
            }
            None => {
                let attempts = self.attempt - 1;
                error!("Reconnection attempts exhausted after {} tries", attempts);
                self.reconnect_timer = None;
                self.ctx.state.set(ConnectionState::Disconnected);
                if let Some(room_id) = self.ctx.rooms.leave() {
                    self.ctx.presence.clear(&room_id);
                }
                self.ctx
                    .handler
                    .on_error(RealtimeError::ReconnectExhausted { attempts });
            }
        }
    }

    async fn attempt_reconnect(&mut self) {
        self.ctx.metrics.increment_reconnects();
        debug!("Reconnect attempt {}", self.attempt);

        let (tx, rx) = mpsc::unbounded_channel();
        let result = tokio::select! {
            result = self.adapter.open(&self.ctx.identity, tx) => result,
            _ = self.ctx.cancel.cancelled() => Err(RealtimeError::Cancelled),
        };

        match result {
            Ok(()) => self.signals = Some(rx),
            // The loop observes the token next and shuts down
            Err(RealtimeError::Cancelled) => {}
            Err(e) => {
                warn!("Reconnect attempt {} failed: {}", self.attempt, e);
                self.adapter.close().await;
                self.schedule_reconnect();
            }
        }
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Send { envelope, reply } => {
                let result = if self.ctx.state.is_connected() {
                    self.adapter.send(&envelope).await
                } else {
                    Err(SendError::NotConnected.into())
                };
                if result.is_ok() {
                    self.ctx.metrics.increment_sent();
                }
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("Dropped '{}' frame: {}", envelope.kind(), e);
                        }
                    }
                }
            }
            Command::Subscribe { room_id, reply } => {
                // While reconnecting the room is picked up on the next open
                let result = if self.ctx.state.is_connected() {
                    self.adapter.subscribe(&room_id, &self.ctx.identity).await
                } else {
                    Ok(())
                };
                if result.is_ok() {
                    debug!("Subscribe issued for room {}", room_id);
                }
                let _ = reply.send(result);
            }
            Command::Unsubscribe { room_id, reply } => {
                let result = if self.ctx.state.is_connected() {
                    self.adapter.unsubscribe(&room_id, &self.ctx.identity).await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn send_heartbeat(&mut self) {
        if !self.ctx.state.is_connected() {
            self.heartbeat.stop();
            return;
        }
        match self.adapter.send(&Envelope::Ping).await {
            Ok(()) => {
                self.ctx.metrics.increment_sent();
                debug!("Heartbeat sent ({} total)", self.heartbeat.sent());
            }
            // Liveness failures arrive as Closed/Error from the link itself
            Err(e) => warn!("Failed to send heartbeat: {}", e),
        }
    }

    /// Stop every timer, leave the room and close the adapter
    async fn shutdown(&mut self) {
        let previous = self.ctx.state.get();
        self.heartbeat.stop();
        self.reconnect_timer = None;

        if let Some(room_id) = self.ctx.rooms.leave() {
            self.ctx.presence.clear(&room_id);
            if previous == ConnectionState::Connected {
                if let Err(e) = self.adapter.unsubscribe(&room_id, &self.ctx.identity).await {
                    debug!("Unsubscribe during shutdown failed: {}", e);
                }
            }
        }

        self.signals = None;
        self.adapter.close().await;
        self.ctx.state.set(ConnectionState::Disconnected);
        self.resolve_connect(Err(RealtimeError::Cancelled));

        if matches!(previous, ConnectionState::Connected | ConnectionState::Reconnecting) {
            self.ctx.handler.on_disconnect();
        }
        info!("Disconnected");
    }
}
