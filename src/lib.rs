//! Clinic Realtime - Main Library
//!
//! Real-time chat, typing, presence and call-signaling transport for the
//! clinic application.
//!
//! ## Architecture
//!
//! - **carelink**: The communication layer (re-exported from workspace)
//! - **config**: YAML configuration with environment overrides
//! - **logging**: Tracing initialization
//! - **shutdown**: Ctrl+C handling for long-running binaries
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use clinic_realtime::bin_common::{load_config_from_env, ConfigType};
//! use clinic_realtime::config::AppConfig;
//!
//! let config = AppConfig::load(load_config_from_env(ConfigType::Realtime))?;
//! clinic_realtime::logging::init_tracing(&config.log_level);
//! ```

// Re-export workspace libraries for convenience
pub use carelink;

pub mod config;
pub mod logging;
pub mod shutdown;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{flag_value, load_config_from_env, parse_args, ConfigType};
    pub use runner::{status_line, BinaryRunner, RunConfig};
}
