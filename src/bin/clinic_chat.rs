//! Terminal chat client
//!
//! Connects with the configured provider, joins a room and relays stdin
//! lines as chat messages while printing everything received.
//!
//! Commands:
//!   /join <room>   switch rooms
//!   /leave         leave the current room
//!   /typing        send a typing indicator
//!   /who           list members present in the room
//!   /status        print connection metrics
//!   /quit          disconnect and exit
//!
//! Usage:
//!   cargo run --bin clinic-chat -- [--config path] [--room id] [--user id] [--name name]

use anyhow::{anyhow, Context, Result};
use clinic_realtime::bin_common::{
    flag_value, load_config_from_env, parse_args, status_line, BinaryRunner, ConfigType, RunConfig,
};
use clinic_realtime::carelink::{
    ChannelHandler, ConnectionManager, EventStream, MessageKind, Metrics, RealtimeEvent,
};
use clinic_realtime::config::{AppConfig, SessionConfig};
use clinic_realtime::logging::init_tracing;
use clinic_realtime::shutdown::ShutdownManager;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

struct ChatApp {
    run_config: RunConfig,
    session: SessionConfig,
    manager: ConnectionManager,
    events: EventStream,
    shutdown: ShutdownManager,
}

enum Input {
    Join(String),
    Leave,
    Typing,
    Who,
    Status,
    Quit,
    Say(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let input = match line.split_once(' ').unwrap_or((line, "")) {
        ("/join", room) if !room.trim().is_empty() => Input::Join(room.trim().to_string()),
        ("/leave", _) => Input::Leave,
        ("/typing", _) => Input::Typing,
        ("/who", _) => Input::Who,
        ("/status", _) => Input::Status,
        ("/quit", _) => Input::Quit,
        _ => Input::Say(line.to_string()),
    };
    Some(input)
}

fn print_event(event: RealtimeEvent) {
    match event {
        RealtimeEvent::Connected => println!("* connected"),
        RealtimeEvent::Disconnected => println!("* disconnected, reconnecting..."),
        RealtimeEvent::Message(m) => println!("[{}] {}: {}", m.room_id, m.sender_name, m.content),
        RealtimeEvent::Typing(t) if t.is_typing => println!("* {} is typing...", t.user_name),
        RealtimeEvent::Typing(_) => {}
        RealtimeEvent::UserJoined(m) => {
            println!("* {} joined", m.user_name.as_deref().unwrap_or(&m.user_id))
        }
        RealtimeEvent::UserLeft(m) => {
            println!("* {} left", m.user_name.as_deref().unwrap_or(&m.user_id))
        }
        RealtimeEvent::Error(e) if e.is_fatal() => println!("! {} (restart to reconnect)", e),
        RealtimeEvent::Error(e) => println!("! {}", e),
    }
}

impl ChatApp {
    async fn handle(&mut self, input: Input) -> Result<bool> {
        match input {
            Input::Join(room) => {
                if let Err(e) = self.manager.join_room(&room).await {
                    warn!("Could not join {}: {}", room, e);
                }
            }
            Input::Leave => self.manager.leave_room().await,
            Input::Typing => self.manager.send_typing(true),
            Input::Who => {
                let members = self.manager.present_users();
                println!("* {} present", members.len());
                for member in members {
                    println!("  - {}", member.user_name.as_deref().unwrap_or(&member.user_id));
                }
            }
            Input::Status => println!("* {}", status_line(&self.manager.metrics())),
            Input::Quit => return Ok(false),
            Input::Say(text) => {
                self.manager.send_typing(false);
                if let Err(e) = self.manager.send_message(text, MessageKind::Text).await {
                    // Messages are never queued while offline
                    println!("! not sent: {}", e);
                }
            }
        }
        Ok(true)
    }
}

impl BinaryRunner for ChatApp {
    async fn run(&mut self) -> Result<()> {
        self.shutdown.spawn_signal_handler();

        self.manager
            .connect(&self.session.user_id, &self.session.user_name)
            .await
            .context("initial connect failed")?;
        if let Some(room) = self.session.room.clone() {
            self.manager.join_room(&room).await?;
        }

        let (lines_tx, mut lines_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut poll = tokio::time::interval(Duration::from_millis(100));
        let mut status = self.run_config.status_ticker();

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                line = lines_rx.recv() => {
                    let Some(line) = line else { break };
                    if let Some(input) = parse_input(&line) {
                        if !self.handle(input).await? {
                            break;
                        }
                    }
                }
                _ = poll.tick() => {
                    for event in self.events.drain() {
                        print_event(event);
                    }
                }
                _ = status.tick() => info!("Status: {}", status_line(&self.manager.metrics())),
            }
        }

        self.manager.disconnect().await;
        for event in self.events.drain() {
            print_event(event);
        }
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn metrics(&self) -> Option<Metrics> {
        Some(self.manager.metrics())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    let config_path = flag_value(&args, "config")
        .map(PathBuf::from)
        .unwrap_or_else(|| load_config_from_env(ConfigType::Realtime));

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing(&config.log_level);
    config.log();

    let mut session = config
        .session
        .clone()
        .ok_or_else(|| anyhow!("no session configured; add a `session` block or pass --user"))?;
    if let Some(user) = flag_value(&args, "user") {
        session.user_id = user.to_string();
    }
    if let Some(name) = flag_value(&args, "name") {
        session.user_name = name.to_string();
    }
    if let Some(room) = flag_value(&args, "room") {
        session.room = Some(room.to_string());
    }

    let (handler, events) = ChannelHandler::new();
    let manager = ConnectionManager::from_config(config.realtime.clone(), handler)?;

    let mut app = ChatApp {
        run_config: RunConfig::new("clinic-chat").with_status_interval(60),
        session,
        manager,
        events,
        shutdown: ShutdownManager::new(),
    };
    app.execute().await
}
