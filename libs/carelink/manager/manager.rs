use crate::core::builder::{states::NoProvider, ManagerBuilder};
use crate::core::config::{ManagerConfig, RealtimeConfig, SharedConfig};
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use crate::core::driver::{Command, Driver, DriverContext, Reply};
use crate::core::presence::PresenceTracker;
use crate::core::rooms::{RoomChange, RoomRegistry};
use crate::protocol::{ChatMessage, Envelope, Identity, MessageKind, RoomMember, TypingIndicator};
use crate::traits::*;
use crate::transport::build_adapter;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to the running driver task
struct DriverHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    task: JoinHandle<Box<dyn TransportAdapter>>,
}

/// Real-time chat and signaling connection for one session
///
/// Owns a single transport adapter and drives the
/// `connect → heartbeat → (drop → reconnect)*` lifecycle on a background
/// task. Callers interact through the operations below and receive
/// everything else through their [`RealtimeHandler`].
///
/// Messages sent while the connection is down are rejected, never queued,
/// and no ordering is promised between messages received before and after
/// a reconnect.
///
/// # Example
/// ```ignore
/// let (handler, events) = ChannelHandler::new();
/// let manager = ConnectionManager::builder()
///     .native_socket("wss://clinic.example/ws")
///     .handler(handler)
///     .build()?;
///
/// manager.connect("doc-1", "Dr. Okafor").await?;
/// manager.join_room("clinic-42").await?;
/// manager.send_message("hello", MessageKind::Text).await?;
///
/// while let Some(event) = events.try_recv_event() {
///     println!("{:?}", event);
/// }
///
/// manager.disconnect().await;
/// ```
pub struct ConnectionManager {
    config: SharedConfig,
    handler: Arc<dyn RealtimeHandler>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    rooms: Arc<RoomRegistry>,
    presence: Arc<PresenceTracker>,
    identity: RwLock<Option<Identity>>,
    /// Adapter waiting to be opened; moves into the driver on `connect()`
    idle_adapter: Mutex<Option<Box<dyn TransportAdapter>>>,
    driver: Mutex<Option<DriverHandle>>,
    /// Set by `disconnect()`; the instance cannot connect again
    terminated: AtomicBool,
}

impl ConnectionManager {
    pub fn builder() -> ManagerBuilder<NoProvider> {
        ManagerBuilder::new()
    }

    /// Build a manager from a validated configuration file
    pub fn from_config(config: RealtimeConfig, handler: impl RealtimeHandler) -> Result<Self> {
        config.validate()?;
        let strategy = config.reconnect.strategy();
        Self::builder()
            .provider(config.provider)
            .heartbeat_interval(std::time::Duration::from_secs(config.heartbeat_interval_secs))
            .reconnect_strategy(strategy)
            .handler(handler)
            .build()
    }

    pub(crate) fn new(
        config: ManagerConfig,
        handler: Arc<dyn RealtimeHandler>,
        adapter: Option<Box<dyn TransportAdapter>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            handler,
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
            metrics: Arc::new(AtomicMetrics::new()),
            rooms: Arc::new(RoomRegistry::new()),
            presence: Arc::new(PresenceTracker::new()),
            identity: RwLock::new(None),
            idle_adapter: Mutex::new(adapter),
            driver: Mutex::new(None),
            terminated: AtomicBool::new(false),
        }
    }

    /// Open the configured transport as `user_id`
    ///
    /// Resolves once the provider acknowledges the connection. A failure is
    /// returned and reported through `on_error`, and is never retried
    /// automatically; only drops of an established connection reconnect.
    pub async fn connect(&self, user_id: impl Into<String>, user_name: impl Into<String>) -> Result<()> {
        let identity = Identity::new(user_id, user_name);
        let (connected_tx, connected_rx) = oneshot::channel();

        {
            let mut slot = self.driver.lock();
            if self.terminated.load(Ordering::Acquire) {
                return Err(RealtimeError::InvalidState(
                    "manager was disconnected; create a new instance".to_string(),
                ));
            }
            if slot.is_some() {
                return Err(RealtimeError::InvalidState(format!(
                    "connect() called while {}",
                    self.state.get()
                )));
            }
            if self
                .state
                .compare_exchange(ConnectionState::Disconnected, ConnectionState::Connecting)
                .is_err()
            {
                return Err(RealtimeError::InvalidState(format!(
                    "connect() called while {}",
                    self.state.get()
                )));
            }

            let adapter = match self.take_adapter() {
                Ok(adapter) => adapter,
                Err(e) => {
                    self.state.set(ConnectionState::Disconnected);
                    warn!("Cannot connect: {}", e);
                    self.handler.on_error(e.clone());
                    return Err(e);
                }
            };

            info!("Connecting via {} as {}", adapter.provider(), identity.user_id);
            *self.identity.write() = Some(identity.clone());

            let (commands, commands_rx) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            let ctx = DriverContext {
                config: Arc::clone(&self.config),
                identity,
                state: Arc::clone(&self.state),
                metrics: Arc::clone(&self.metrics),
                rooms: Arc::clone(&self.rooms),
                presence: Arc::clone(&self.presence),
                handler: Arc::clone(&self.handler),
                cancel: cancel.clone(),
            };
            let driver = Driver::new(ctx, adapter, commands_rx, connected_tx);
            let task = tokio::spawn(driver.run());
            *slot = Some(DriverHandle {
                commands,
                cancel,
                task,
            });
        }

        let result = connected_rx.await.unwrap_or(Err(RealtimeError::Cancelled));
        if result.is_err() {
            self.reclaim_failed_driver().await;
        }
        result
    }

    fn take_adapter(&self) -> Result<Box<dyn TransportAdapter>> {
        if let Some(adapter) = self.idle_adapter.lock().take() {
            return Ok(adapter);
        }
        match self.config.provider() {
            Some(provider) => build_adapter(provider),
            None => Err(RealtimeError::Configuration(
                "no transport provider configured".to_string(),
            )),
        }
    }

    /// After a failed first connect, keep the adapter so `connect()` can be retried
    async fn reclaim_failed_driver(&self) {
        let handle = self.driver.lock().take();
        // A concurrent disconnect() already took and awaited the task
        let Some(handle) = handle else {
            return;
        };
        match handle.task.await {
            Ok(adapter) => {
                if !self.terminated.load(Ordering::Acquire) {
                    *self.idle_adapter.lock() = Some(adapter);
                }
            }
            Err(e) => warn!("Connection driver ended abnormally: {}", e),
        }
    }

    fn commands(&self) -> Result<mpsc::UnboundedSender<Command>> {
        self.driver
            .lock()
            .as_ref()
            .map(|handle| handle.commands.clone())
            .ok_or_else(|| SendError::NotConnected.into())
    }

    /// Hand a command to the driver and wait for its outcome
    async fn request(&self, build: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.commands()?
            .send(build(reply))
            .map_err(|_| RealtimeError::from(SendError::NotConnected))?;
        outcome
            .await
            .unwrap_or_else(|_| Err(SendError::NotConnected.into()))
    }

    /// Enter `room_id`, leaving any room held before
    ///
    /// Returns once the subscribe request has been issued to the provider;
    /// the acknowledgement arrives asynchronously. Requires `Connected`;
    /// otherwise the failure is returned and reported through `on_error`.
    /// If the subscribe fails no room is held afterwards. Joining the room
    /// already held does nothing.
    pub async fn join_room(&self, room_id: impl AsRef<str>) -> Result<()> {
        let room_id = room_id.as_ref().trim();
        if room_id.is_empty() {
            let e = RealtimeError::InvalidState("room id must not be empty".to_string());
            self.handler.on_error(e.clone());
            return Err(e);
        }

        if !self.state.is_connected() {
            let e = RealtimeError::InvalidState(format!(
                "join_room('{}') requires a connection (state: {})",
                room_id,
                self.state.get()
            ));
            warn!("{}", e);
            self.handler.on_error(e.clone());
            return Err(e);
        }

        let previous = match self.rooms.join(room_id) {
            RoomChange::Unchanged => {
                debug!("Already in room {}", room_id);
                return Ok(());
            }
            RoomChange::Switched { previous } => previous,
        };

        if let Some(previous) = previous {
            self.presence.clear(&previous);
            let room = previous.clone();
            if let Err(e) = self
                .request(|reply| Command::Unsubscribe { room_id: room, reply })
                .await
            {
                warn!("Failed to leave room {}: {}", previous, e);
            } else {
                info!("Left room {}", previous);
            }
        }

        self.presence.reset(room_id);
        let room = room_id.to_string();
        match self
            .request(|reply| Command::Subscribe { room_id: room, reply })
            .await
        {
            Ok(()) => {
                info!("Joined room {}", room_id);
                Ok(())
            }
            Err(e) => {
                // A later join may already have replaced this room
                if self.rooms.leave_if(room_id) {
                    self.presence.clear(room_id);
                }
                warn!("Failed to join room {}: {}", room_id, e);
                self.handler.on_error(e.clone());
                Err(e)
            }
        }
    }

    /// Leave the held room; does nothing if none is held
    pub async fn leave_room(&self) {
        let Some(room_id) = self.rooms.leave() else {
            debug!("leave_room() with no room held");
            return;
        };
        self.presence.clear(&room_id);

        if self.state.is_connected() {
            let room = room_id.clone();
            if let Err(e) = self
                .request(|reply| Command::Unsubscribe { room_id: room, reply })
                .await
            {
                warn!("Failed to unsubscribe from room {}: {}", room_id, e);
            }
        }
        info!("Left room {}", room_id);
    }

    /// Send a chat message to the held room
    ///
    /// Fails with `SendError` when not connected or not in a room, in which
    /// case nothing is transmitted. Returns the message as sent.
    pub async fn send_message(&self, content: impl Into<String>, kind: MessageKind) -> Result<ChatMessage> {
        if !self.state.is_connected() {
            return Err(SendError::NotConnected.into());
        }
        let room_id = self.rooms.current_room().ok_or(SendError::NoRoom)?;
        let identity = self.user().ok_or(SendError::NotConnected)?;

        let message = ChatMessage::new(kind, content, &identity, room_id);
        let envelope = Envelope::Message(message.clone());
        self.request(|reply| Command::Send {
            envelope,
            reply: Some(reply),
        })
        .await?;

        debug!("Sent message {} to room {}", message.id, message.room_id);
        Ok(message)
    }

    /// `send_message(content, MessageKind::Text)`
    pub async fn send_text(&self, content: impl Into<String>) -> Result<ChatMessage> {
        self.send_message(content, MessageKind::Text).await
    }

    /// Advisory typing indicator; failures are logged, never returned
    pub fn send_typing(&self, is_typing: bool) {
        if !self.state.is_connected() {
            debug!("Typing indicator skipped: not connected");
            return;
        }
        let (Some(room_id), Some(identity)) = (self.rooms.current_room(), self.user()) else {
            debug!("Typing indicator skipped: no room held");
            return;
        };

        let envelope = Envelope::Typing(TypingIndicator {
            user_id: identity.user_id,
            user_name: identity.user_name,
            room_id,
            is_typing,
        });
        let sent = self.commands().and_then(|commands| {
            commands
                .send(Command::Send {
                    envelope,
                    reply: None,
                })
                .map_err(|_| SendError::NotConnected.into())
        });
        if let Err(e) = sent {
            warn!("Typing indicator not sent: {}", e);
        }
    }

    /// Close the connection for good
    ///
    /// Cancels the heartbeat and any pending reconnect, leaves the room and
    /// closes the adapter. Once this returns no callback or timer of this
    /// instance fires again, and `connect()` is rejected.
    pub async fn disconnect(&self) {
        self.terminated.store(true, Ordering::Release);
        let handle = self.driver.lock().take();

        if let Some(handle) = handle {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                warn!("Connection driver ended abnormally: {}", e);
            }
        }

        if let Some(room_id) = self.rooms.leave() {
            self.presence.clear(&room_id);
        }
        self.idle_adapter.lock().take();
        self.state.set(ConnectionState::Disconnected);
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn current_room(&self) -> Option<String> {
        self.rooms.current_room()
    }

    /// Members known to be present in the held room
    pub fn present_users(&self) -> Vec<RoomMember> {
        self.rooms
            .current_room()
            .map(|room_id| self.presence.members(&room_id))
            .unwrap_or_default()
    }

    /// Identity given to the last `connect()`
    pub fn user(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::snapshot(&self.metrics, &self.state)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The driver cleans up on its own once cancelled
        if let Some(handle) = self.driver.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}
