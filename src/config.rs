//! Application configuration
//!
//! YAML file plus `.env`/environment overrides for provider credentials,
//! which should not live in the checked-in file.

use carelink::config::{ProviderConfig, PusherAuthConfig, PusherConfig, RealtimeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Who the demo client connects as, and where
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub user_id: String,
    pub user_name: String,
    /// Room joined right after connecting
    #[serde(default)]
    pub room: Option<String>,
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub session: Option<SessionConfig>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Source of override values, so tests need not touch the process env
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }
}

impl AppConfig {
    /// Load configuration from a YAML file and `.env`
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        Self::from_yaml(&yaml_content, &ProcessEnv)
    }

    /// Parse YAML, apply environment overrides and validate
    pub fn from_yaml(yaml: &str, env: &impl EnvSource) -> Result<Self> {
        let mut config: AppConfig = serde_yaml::from_str(yaml)?;

        // Don't fail if .env doesn't exist
        dotenv::dotenv().ok();

        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, env: &impl EnvSource) {
        if let Some(url) = env.var("REALTIME_URL") {
            info!("Overriding native socket url from environment variable");
            self.realtime.provider = ProviderConfig::NativeSocket { url };
        }

        if let Some(app_key) = env.var("PUSHER_APP_KEY") {
            info!("Overriding pusher app key from environment variable");
            match &mut self.realtime.provider {
                ProviderConfig::Pusher(pusher) => pusher.app_key = app_key,
                other => *other = ProviderConfig::Pusher(PusherConfig::new(app_key)),
            }
        }

        let ProviderConfig::Pusher(pusher) = &mut self.realtime.provider else {
            return;
        };

        if let Some(cluster) = env.var("PUSHER_CLUSTER") {
            pusher.cluster = Some(cluster);
        }

        // The auth route wins over a local secret when both are present
        if let Some(url) = env.var("PUSHER_AUTH_ENDPOINT") {
            info!("Using pusher auth endpoint from environment variable");
            pusher.auth = Some(PusherAuthConfig::Endpoint {
                url,
                headers: HashMap::new(),
            });
        } else if let Some(secret) = env.var("PUSHER_APP_SECRET") {
            info!("Using pusher app secret from environment variable");
            pusher.auth = Some(PusherAuthConfig::Secret { secret });
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.realtime
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        if let Some(session) = &self.session {
            if session.user_id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "session.user_id cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        match &self.realtime.provider {
            ProviderConfig::NativeSocket { url } => info!("  Provider: native socket ({})", url),
            ProviderConfig::Pusher(pusher) => info!(
                "  Provider: pusher (cluster {}, presence {})",
                pusher.cluster.as_deref().unwrap_or("default"),
                if pusher.auth.is_some() { "on" } else { "off" }
            ),
        }
        info!("  Heartbeat interval: {} seconds", self.realtime.heartbeat_interval_secs);
        info!(
            "  Reconnect: base {} ms, max {} attempts",
            self.realtime.reconnect.base_delay_ms, self.realtime.reconnect.max_attempts
        );
        info!("  Log level: {}", self.log_level);
    }
}
