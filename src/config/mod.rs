//! Configuration module for pvsave.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Backends (name, path, format)
//! - Monitor sets (period, restore stage, backends, channels, channel files)
//! - Scheduler settings and the minimum save period
//! - Simulated channels used by `pvsave run`

mod app;
mod monitor;
mod validation;

pub use app::{AppConfig, DEFAULT_THREAD_NAME, SchedulerConfig};
pub use monitor::{BackendConfig, ChannelFileConfig, MonitorSetConfig};
pub use validation::{ConfigError, expand_env_vars, expand_macros, parse_macros};
