//! Monitor set definition and restore stages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::backend::SharedBackend;

/// Default minimum save period (10 seconds).
pub const DEFAULT_MIN_PERIOD: Duration = Duration::from_secs(10);

/// Process lifecycle checkpoint at which a monitor set restores.
///
/// Ordered: stages are reached in declaration order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum RestoreStage {
    /// Channels are reachable but the database is not initialised.
    #[default]
    #[strum(to_string = "after_channel_init", serialize = "AfterChannelInit")]
    #[serde(alias = "AfterChannelInit")]
    AfterChannelInit,
    /// Database initialised, processing not yet started.
    #[strum(to_string = "after_database_init", serialize = "AfterDatabaseInit")]
    #[serde(alias = "AfterDatabaseInit")]
    AfterDatabaseInit,
    /// Fully running. The scheduler starts after this stage.
    #[strum(to_string = "after_running", serialize = "AfterRunning")]
    #[serde(alias = "AfterRunning")]
    AfterRunning,
}

impl RestoreStage {
    /// The last stage; reaching it starts the scheduler.
    pub const FINAL: Self = Self::AfterRunning;
}

/// A backend attached to a monitor set, resolved once at attach time.
#[derive(Clone)]
pub struct BackendRef {
    pub name: String,
    pub backend: SharedBackend,
}

impl std::fmt::Debug for BackendRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Static configuration of a group of channels saved together.
///
/// Built through [`Registry`](crate::monitor::Registry); read-only afterwards.
#[derive(Debug, Clone)]
pub struct MonitorSet {
    name: String,
    period: Duration,
    stage: RestoreStage,
    patterns: Vec<String>,
    backends: Vec<BackendRef>,
}

impl MonitorSet {
    pub(crate) fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            stage: RestoreStage::default(),
            patterns: Vec::new(),
            backends: Vec::new(),
        }
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Save period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stage at which this set restores.
    pub fn stage(&self) -> RestoreStage {
        self.stage
    }

    /// Channel-name patterns in configuration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Attached backends in configuration order.
    pub fn backends(&self) -> &[BackendRef] {
        &self.backends
    }

    pub(crate) fn set_stage(&mut self, stage: RestoreStage) {
        self.stage = stage;
    }

    pub(crate) fn push_pattern(&mut self, pattern: String) {
        self.patterns.push(pattern);
    }

    pub(crate) fn push_backend(&mut self, backend: BackendRef) {
        self.backends.push(backend);
    }

    pub(crate) fn has_backend(&self, name: &str) -> bool {
        self.backends.iter().any(|b| b.name == name)
    }
}
