//! Administrative surface for building monitor sets.
//!
//! Every operation validates its arguments first and leaves the registry
//! unchanged on error. Once handed to [`PvSave`](crate::PvSave) the sets are
//! frozen.

use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::{Backend, BackendRegistry, pindent};
use crate::config::{ConfigError, expand_macros, parse_macros};
use crate::monitor::{BackendRef, DEFAULT_MIN_PERIOD, MonitorSet, RestoreStage};

/// Monitor sets and backends under construction.
#[derive(Debug, Clone)]
pub struct Registry {
    min_period: Duration,
    backends: BackendRegistry,
    sets: Vec<MonitorSet>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry with the default minimum period.
    pub fn new() -> Self {
        Self::with_min_period(DEFAULT_MIN_PERIOD)
    }

    /// Create an empty registry rejecting periods below `min_period`.
    pub fn with_min_period(min_period: Duration) -> Self {
        Self {
            min_period,
            backends: BackendRegistry::new(),
            sets: Vec::new(),
        }
    }

    pub fn min_period(&self) -> Duration {
        self.min_period
    }

    /// Create a monitor set.
    ///
    /// # Errors
    /// `DuplicateMonitorSet` if the name is taken, `InvalidPeriod` if the
    /// period is below the minimum.
    pub fn create_monitor_set(&mut self, name: &str, period: Duration) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "monitor set name must not be empty".to_string(),
            ));
        }
        if self.monitor_set(name).is_some() {
            return Err(ConfigError::DuplicateMonitorSet(name.to_string()));
        }
        if period.is_zero() || period < self.min_period {
            return Err(ConfigError::InvalidPeriod {
                name: name.to_string(),
                period,
                min: self.min_period,
            });
        }
        self.sets.push(MonitorSet::new(name, period));
        tracing::debug!(monitor_set = %name, period = ?period, "Monitor set created");
        Ok(())
    }

    /// Register a backend under its own name.
    pub fn register_backend<B: Backend>(&mut self, backend: B) -> Result<(), ConfigError> {
        self.backends.register(backend).map(|_| ())
    }

    /// Remove a backend from the registry.
    ///
    /// Sets it is already attached to keep using it.
    pub fn remove_backend(&mut self, name: &str) -> Result<(), ConfigError> {
        self.backends
            .remove(name)
            .map(|_| tracing::debug!(backend = %name, "Backend removed"))
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_string()))
    }

    /// Attach a registered backend to a monitor set.
    ///
    /// # Errors
    /// `UnknownMonitorSet`, `UnknownBackend`, or `ValidationError` when the
    /// backend is already attached to the set.
    pub fn attach_backend(&mut self, set: &str, backend: &str) -> Result<(), ConfigError> {
        let shared = self
            .backends
            .get(backend)
            .ok_or_else(|| ConfigError::UnknownBackend(backend.to_string()))?;
        let monitor_set = self.monitor_set_mut(set)?;
        if monitor_set.has_backend(backend) {
            return Err(ConfigError::ValidationError(format!(
                "backend '{backend}' already attached to monitor set '{set}'"
            )));
        }
        monitor_set.push_backend(BackendRef {
            name: backend.to_string(),
            backend: shared,
        });
        tracing::debug!(monitor_set = %set, backend = %backend, "Backend attached");
        Ok(())
    }

    /// Add a channel name or glob pattern to a monitor set.
    pub fn add_channel(&mut self, set: &str, pattern: &str) -> Result<(), ConfigError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ConfigError::ValidationError(
                "channel pattern must not be empty".to_string(),
            ));
        }
        self.monitor_set_mut(set)?.push_pattern(pattern.to_string());
        Ok(())
    }

    /// Add one pattern per line of a channel file.
    ///
    /// Blank lines and `#` comments are skipped. `macros` is a definition list
    /// such as `P=IOC:,R=1`, applied to each line before it is added.
    ///
    /// Returns the number of patterns added.
    pub fn add_channels_from_file(
        &mut self,
        set: &str,
        path: impl AsRef<Path>,
        macros: &str,
    ) -> Result<usize, ConfigError> {
        self.monitor_set(set)
            .ok_or_else(|| ConfigError::UnknownMonitorSet(set.to_string()))?;

        let path = path.as_ref();
        let content = std::fs::read_to_string(path).inspect_err(|e| {
            tracing::error!(monitor_set = %set, path = %path.display(), error = %e, "Failed to read channel file");
        })?;
        let macros = parse_macros(macros);

        let patterns: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| expand_macros(line, &macros).trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        let count = patterns.len();
        let monitor_set = self.monitor_set_mut(set)?;
        for pattern in patterns {
            monitor_set.push_pattern(pattern);
        }
        tracing::debug!(monitor_set = %set, path = %path.display(), count, "Channel file loaded");
        Ok(count)
    }

    /// Set the stage at which a monitor set restores.
    pub fn set_restore_stage(&mut self, set: &str, stage: RestoreStage) -> Result<(), ConfigError> {
        self.monitor_set_mut(set)?.set_stage(stage);
        Ok(())
    }

    /// Set the restore stage from its text form (case-insensitive).
    pub fn set_restore_stage_str(&mut self, set: &str, stage: &str) -> Result<(), ConfigError> {
        let stage = RestoreStage::from_str(stage.trim())
            .map_err(|_| ConfigError::InvalidStage(stage.to_string()))?;
        self.set_restore_stage(set, stage)
    }

    pub fn monitor_set(&self, name: &str) -> Option<&MonitorSet> {
        self.sets.iter().find(|s| s.name() == name)
    }

    /// Monitor sets in creation order.
    pub fn monitor_sets(&self) -> &[MonitorSet] {
        &self.sets
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Write a description of every monitor set and backend.
    pub fn report(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Monitor sets ({}):", self.sets.len())?;
        for set in &self.sets {
            report_set(out, set)?;
        }
        writeln!(out, "Backends ({}):", self.backends.len())?;
        self.backends.report(out, 2)
    }

    pub(crate) fn into_parts(self) -> (Vec<MonitorSet>, BackendRegistry, Duration) {
        (self.sets, self.backends, self.min_period)
    }

    fn monitor_set_mut(&mut self, name: &str) -> Result<&mut MonitorSet, ConfigError> {
        self.sets
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| ConfigError::UnknownMonitorSet(name.to_string()))
    }
}

/// Write the static part of a monitor set.
fn report_set(out: &mut dyn Write, set: &MonitorSet) -> io::Result<()> {
    pindent(out, 2)?;
    writeln!(out, "MonitorSet {}", set.name())?;
    pindent(out, 4)?;
    writeln!(out, "period: {}", humantime::format_duration(set.period()))?;
    pindent(out, 4)?;
    writeln!(out, "stage: {}", set.stage())?;
    pindent(out, 4)?;
    let backends: Vec<&str> = set.backends().iter().map(|b| b.name.as_str()).collect();
    writeln!(out, "backends: {}", backends.join(", "))?;
    pindent(out, 4)?;
    writeln!(out, "patterns: {}", set.patterns().len())?;
    for pattern in set.patterns() {
        pindent(out, 6)?;
        writeln!(out, "{pattern}")?;
    }
    Ok(())
}
