//! Heartbeat for idle-timeout protection
//!
//! # Architecture
//!
//! The monitor is a timer owned by the driver task, polled in the same
//! `select!` as inbound signals and commands:
//!
//! ```text
//! ┌──────────────── driver task ────────────────┐
//! │  select! {                                   │
//! │    signal  = adapter signals  => route       │
//! │    command = manager commands => execute     │
//! │    _       = heartbeat.tick() => send ping ──┼──> adapter ──> network
//! │  }                                           │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The heartbeat never declares a connection dead. Liveness failure comes
//! from the adapter's own `Closed`/`Error` signal; the ping only keeps
//! proxies and load balancers from closing an idle channel. No pong is
//! expected.
//!
//! Because the timer lives inside the driver, stopping it is synchronous:
//! once `stop()` returns no further tick can be observed, and once the
//! driver exits there is no timer left at all.

use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

/// Default interval between liveness frames
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct HeartbeatMonitor {
    period: Duration,
    timer: Option<Interval>,
    sent: u64,
}

impl HeartbeatMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            timer: None,
            sent: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Number of liveness frames sent over the monitor's lifetime
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Start (or restart) the timer; the first tick is one full period away
    pub fn start(&mut self) {
        let mut ticker = interval(self.period);
        // If the driver is busy, skip missed ticks rather than bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.reset();
        self.timer = Some(ticker);
        debug!("Heartbeat started with interval: {:?}", self.period);
    }

    pub fn stop(&mut self) {
        if self.timer.take().is_some() {
            debug!("Heartbeat stopped");
        }
    }

    /// Resolve on the next tick; pending forever while stopped
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
                self.sent += 1;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_a_full_period() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(30));
        monitor.start();

        let started = Instant::now();
        monitor.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(monitor.sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_never_ticks() {
        let mut monitor = HeartbeatMonitor::new(Duration::from_secs(1));
        monitor.start();
        monitor.stop();

        assert!(!monitor.is_running());
        assert!(timeout(Duration::from_secs(10), monitor.tick()).await.is_err());
        assert_eq!(monitor.sent(), 0);
    }
}
