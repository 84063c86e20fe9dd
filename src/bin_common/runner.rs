//! Binary runner utilities
//!
//! Wraps a long-running client with start/stop logging and a periodic
//! status line built from the connection metrics.

use carelink::Metrics;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{error, info};

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Time between status lines
    pub status_interval: Duration,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status_interval: Duration::from_secs(300),
        }
    }

    pub fn with_status_interval(mut self, secs: u64) -> Self {
        self.status_interval = Duration::from_secs(secs);
        self
    }

    /// Status ticker whose first tick is one full interval away
    pub fn status_ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.status_interval, self.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// One-line summary of the connection counters
pub fn status_line(metrics: &Metrics) -> String {
    format!(
        "{} | sent {} | received {} | dropped {} | reconnects {}",
        metrics.connection_state,
        metrics.messages_sent,
        metrics.messages_received,
        metrics.frames_dropped,
        metrics.reconnect_count
    )
}

/// Trait for binary applications
#[allow(async_fn_in_trait)]
pub trait BinaryRunner {
    async fn run(&mut self) -> anyhow::Result<()>;

    fn config(&self) -> &RunConfig;

    /// Metrics logged when the run ends
    fn metrics(&self) -> Option<Metrics> {
        None
    }

    /// Run to completion, logging how it ended
    async fn execute(&mut self) -> anyhow::Result<()> {
        let name = self.config().name.clone();
        info!("Starting {} (Ctrl+C to stop)", name);

        let result = self.run().await;
        let summary = self.metrics().map(|m| status_line(&m));
        match &result {
            Ok(()) => info!("{} stopped: {}", name, summary.as_deref().unwrap_or("no metrics")),
            Err(e) => error!("{} failed: {:#}", name, e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink::ConnectionState;

    struct Scripted {
        config: RunConfig,
        fail: bool,
        runs: usize,
    }

    impl BinaryRunner for Scripted {
        async fn run(&mut self) -> anyhow::Result<()> {
            self.runs += 1;
            if self.fail {
                anyhow::bail!("initial connect failed");
            }
            Ok(())
        }

        fn config(&self) -> &RunConfig {
            &self.config
        }
    }

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("clinic-chat").with_status_interval(60);

        assert_eq!(config.name, "clinic-chat");
        assert_eq!(config.status_interval, Duration::from_secs(60));
        assert_eq!(RunConfig::new("default").status_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_status_line_lists_every_counter() {
        let metrics = Metrics {
            messages_sent: 3,
            messages_received: 5,
            reconnect_count: 1,
            frames_dropped: 2,
            connection_state: ConnectionState::Reconnecting,
        };

        assert_eq!(
            status_line(&metrics),
            "reconnecting | sent 3 | received 5 | dropped 2 | reconnects 1"
        );
    }

    #[tokio::test]
    async fn test_status_ticker_waits_a_full_interval() {
        let config = RunConfig::new("clinic-chat").with_status_interval(3600);
        let mut ticker = config.status_ticker();

        let early = tokio::time::timeout(Duration::from_millis(20), ticker.tick()).await;
        assert!(early.is_err());
    }

    #[tokio::test]
    async fn test_execute_returns_run_result() {
        let mut ok = Scripted { config: RunConfig::new("ok"), fail: false, runs: 0 };
        assert!(ok.execute().await.is_ok());
        assert_eq!(ok.runs, 1);

        let mut failing = Scripted { config: RunConfig::new("failing"), fail: true, runs: 0 };
        let err = failing.execute().await.unwrap_err();
        assert_eq!(err.to_string(), "initial connect failed");
        assert_eq!(failing.runs, 1);
    }
}
