//! Monitor set and backend configuration entries.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{FileBackend, FileFormat};
use crate::monitor::RestoreStage;

/// A file backend declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique backend name.
    pub name: String,

    /// Store file path.
    pub path: PathBuf,

    /// Store format (default: text).
    #[serde(default)]
    pub format: FileFormat,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            format,
        }
    }

    /// Instantiate the backend.
    pub fn build(&self) -> FileBackend {
        FileBackend::new(&self.name, &self.path, self.format)
    }
}

/// A channel file with its macro definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFileConfig {
    pub path: PathBuf,

    /// Macro definitions such as `P=IOC:,R=1`.
    #[serde(default)]
    pub macros: String,
}

/// A monitor set declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSetConfig {
    /// Unique monitor set name.
    pub name: String,

    /// Save period, e.g. `30s` or `5m`.
    #[serde(with = "humantime_serde")]
    pub period: Duration,

    /// Restore stage (default: after_channel_init).
    #[serde(default)]
    pub stage: RestoreStage,

    /// Names of attached backends, in restore priority order.
    #[serde(default)]
    pub backends: Vec<String>,

    /// Channel names or glob patterns.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Files listing one channel pattern per line.
    #[serde(default)]
    pub channel_files: Vec<ChannelFileConfig>,
}

impl MonitorSetConfig {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            stage: RestoreStage::default(),
            backends: Vec::new(),
            channels: Vec::new(),
            channel_files: Vec::new(),
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backends.push(backend.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    pub fn with_stage(mut self, stage: RestoreStage) -> Self {
        self.stage = stage;
        self
    }
}
