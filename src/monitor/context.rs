//! Save context: runtime state of one monitor set.
//!
//! A context starts unresolved. [`SaveContext::resolve`] turns the set's
//! patterns into channel handles once; from then on the context can save and
//! restore any number of times (restore is applied at most once per process
//! lifecycle by the caller).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::backend::lock_backend;
use crate::channel::{ChannelHandle, ChannelSource};
use crate::monitor::{MonitorSet, RestoreStage};
use crate::value::Value;

/// All contexts behind the single lock that serializes saves.
pub type SharedContexts = Arc<Mutex<Vec<SaveContext>>>;

/// Lock the shared contexts, recovering from poisoning.
pub fn lock_contexts(contexts: &SharedContexts) -> MutexGuard<'_, Vec<SaveContext>> {
    contexts.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of the most recent save.
///
/// Ordered by severity, so the worst status of several is their maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SaveStatus {
    /// No save has run yet.
    #[default]
    Never,
    /// Every channel and backend succeeded.
    Ok,
    /// At least one channel or backend failed.
    Failed,
}

impl SaveStatus {
    /// Numeric code: 0 for success, non-zero otherwise.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Failed => 1,
            Self::Never => -1,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    fn from_failed(failed: bool) -> Self {
        if failed { Self::Failed } else { Self::Ok }
    }
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Never => "never",
            Self::Ok => "ok",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Result of one save cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub monitor_set: String,
    /// Resolved channels in the set.
    pub channels: usize,
    /// Channels read successfully and streamed to the backends.
    pub written: usize,
    pub failed_channels: Vec<String>,
    pub failed_backends: Vec<String>,
    pub status: SaveStatus,
}

/// Result of one restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub monitor_set: String,
    /// Backend that supplied the data, if any did.
    pub backend: Option<String>,
    /// Channels written back.
    pub restored: usize,
    pub failed_channels: Vec<String>,
    pub status: SaveStatus,
}

/// Bookkeeping snapshot for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStatus {
    pub name: String,
    pub period: Duration,
    pub stage: RestoreStage,
    pub channels: usize,
    pub last_save: Option<DateTime<Utc>>,
    pub last_status: SaveStatus,
    pub restored: bool,
}

/// Runtime state of one monitor set.
#[derive(Debug)]
pub struct SaveContext {
    set: MonitorSet,
    channels: Vec<ChannelHandle>,
    resolved: bool,
    restored: bool,
    last_save: Option<DateTime<Utc>>,
    last_status: SaveStatus,
    anchor: Option<Instant>,
}

impl SaveContext {
    pub fn new(set: MonitorSet) -> Self {
        Self {
            set,
            channels: Vec::new(),
            resolved: false,
            restored: false,
            last_save: None,
            last_status: SaveStatus::Never,
            anchor: None,
        }
    }

    pub fn set(&self) -> &MonitorSet {
        &self.set
    }

    pub fn name(&self) -> &str {
        self.set.name()
    }

    pub fn channels(&self) -> &[ChannelHandle] {
        &self.channels
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    pub fn last_save(&self) -> Option<DateTime<Utc>> {
        self.last_save
    }

    pub fn last_status(&self) -> SaveStatus {
        self.last_status
    }

    pub fn status(&self) -> ContextStatus {
        ContextStatus {
            name: self.set.name().to_string(),
            period: self.set.period(),
            stage: self.set.stage(),
            channels: self.channels.len(),
            last_save: self.last_save,
            last_status: self.last_status,
            restored: self.restored,
        }
    }

    /// Resolve the set's patterns into channel handles. Runs once.
    ///
    /// Returns the number of resolved channels.
    pub fn resolve(&mut self, source: &dyn ChannelSource) -> usize {
        if self.resolved {
            return self.channels.len();
        }
        self.channels = source.connect(self.set.patterns());
        self.resolved = true;
        tracing::info!(
            monitor_set = %self.set.name(),
            patterns = self.set.patterns().len(),
            channels = self.channels.len(),
            "Channels resolved"
        );
        self.channels.len()
    }

    /// Time left until the next scheduled save, measured from `now`.
    ///
    /// A context that was never stamped counts from `now`.
    pub fn remaining(&self, now: Instant) -> Duration {
        let anchor = self.anchor.unwrap_or(now);
        self.set
            .period()
            .saturating_sub(now.saturating_duration_since(anchor))
    }

    /// Record `at` as the start of the current period.
    pub(crate) fn stamp(&mut self, at: Instant) {
        self.anchor = Some(at);
    }

    pub(crate) fn is_stamped(&self) -> bool {
        self.anchor.is_some()
    }

    /// Read every channel and stream the values to every writable backend.
    pub fn save(&mut self, source: &dyn ChannelSource) -> SaveReport {
        let name = self.set.name().to_string();
        let mut failed_channels = Vec::new();
        let mut values = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            match source.get(channel) {
                Ok(value) => values.push((channel.name.as_str(), value)),
                Err(e) => {
                    tracing::warn!(monitor_set = %name, channel = %channel.name, error = %e, "Failed to read channel");
                    failed_channels.push(channel.name.clone());
                }
            }
        }

        let mut failed_backends: Vec<String> = Vec::new();
        for backend_ref in self.set.backends() {
            let mut backend = lock_backend(&backend_ref.backend);
            if !backend.capabilities().write {
                continue;
            }
            if let Err(e) = backend.begin_write() {
                tracing::error!(monitor_set = %name, backend = %backend_ref.name, error = %e, "Failed to open backend for writing");
                failed_backends.push(backend_ref.name.clone());
                continue;
            }

            let mut write_failed = false;
            for (channel, value) in &values {
                if let Err(e) = backend.write_data(channel, value) {
                    tracing::error!(monitor_set = %name, backend = %backend_ref.name, channel = %channel, error = %e, "Failed to write value");
                    write_failed = true;
                }
            }
            if let Err(e) = backend.end_write() {
                tracing::error!(monitor_set = %name, backend = %backend_ref.name, error = %e, "Failed to close backend after writing");
                write_failed = true;
            }
            if write_failed {
                failed_backends.push(backend_ref.name.clone());
            }
        }

        let status = SaveStatus::from_failed(!failed_channels.is_empty() || !failed_backends.is_empty());
        self.last_save = Some(Utc::now());
        self.last_status = status;

        let report = SaveReport {
            monitor_set: name,
            channels: self.channels.len(),
            written: values.len(),
            failed_channels,
            failed_backends,
            status,
        };
        tracing::debug!(
            monitor_set = %report.monitor_set,
            written = report.written,
            status = %report.status,
            "Save complete"
        );
        report
    }

    /// Load the first non-empty snapshot and write it back to the channels.
    pub fn restore(&mut self, source: &dyn ChannelSource) -> RestoreOutcome {
        let name = self.set.name().to_string();
        self.restored = true;

        let Some((backend, records)) = self.load_first() else {
            tracing::warn!(monitor_set = %name, "No backend supplied data, nothing restored");
            return RestoreOutcome {
                monitor_set: name,
                backend: None,
                restored: 0,
                failed_channels: Vec::new(),
                status: SaveStatus::Failed,
            };
        };

        let mut restored = 0;
        let mut failed_channels = Vec::new();
        for channel in &self.channels {
            let Some(value) = records.get(&channel.name) else {
                continue;
            };
            match source.put(channel, value) {
                Ok(()) => restored += 1,
                Err(e) => {
                    tracing::warn!(monitor_set = %name, channel = %channel.name, error = %e, "Failed to restore channel");
                    failed_channels.push(channel.name.clone());
                }
            }
        }

        tracing::info!(monitor_set = %name, backend = %backend, restored, failed = failed_channels.len(), "Restore complete");
        let status = SaveStatus::from_failed(!failed_channels.is_empty());
        RestoreOutcome {
            monitor_set: name,
            backend: Some(backend),
            restored,
            failed_channels,
            status,
        }
    }

    fn load_first(&self) -> Option<(String, HashMap<String, Value>)> {
        for backend_ref in self.set.backends() {
            let mut backend = lock_backend(&backend_ref.backend);
            if !backend.capabilities().read {
                continue;
            }
            if let Err(e) = backend.begin_read() {
                tracing::warn!(monitor_set = %self.set.name(), backend = %backend_ref.name, error = %e, "Failed to open backend for reading");
                continue;
            }
            let records = backend.read_data();
            if let Err(e) = backend.end_read() {
                tracing::warn!(monitor_set = %self.set.name(), backend = %backend_ref.name, error = %e, "Failed to close backend after reading");
            }

            match records {
                Ok(records) if !records.is_empty() => {
                    return Some((backend_ref.name.clone(), records));
                }
                Ok(_) => {
                    tracing::debug!(monitor_set = %self.set.name(), backend = %backend_ref.name, "Backend holds no records");
                }
                Err(e) => {
                    tracing::warn!(monitor_set = %self.set.name(), backend = %backend_ref.name, error = %e, "Failed to read backend");
                }
            }
        }
        None
    }
}

/// Save every context and stamp each with `now`.
pub fn save_all(
    contexts: &mut [SaveContext],
    source: &dyn ChannelSource,
    now: Instant,
) -> Vec<SaveReport> {
    contexts
        .iter_mut()
        .map(|ctx| {
            let report = ctx.save(source);
            ctx.stamp(now);
            report
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Backend, BackendError, BackendRegistry, Capabilities, FileBackend, FileFormat,
    };
    use crate::channel::MemoryChannelSource;
    use crate::monitor::BackendRef;
    use std::io::{self, Write};
    use tempfile::tempdir;

    type Events = Arc<Mutex<Vec<String>>>;

    /// Backend recording calls, with switchable failures.
    #[derive(Default)]
    struct Recorder {
        name: String,
        caps: Capabilities,
        fail_begin_write: bool,
        fail_write_for: Option<String>,
        fail_begin_read: bool,
        stored: HashMap<String, Value>,
        events: Events,
    }

    impl Recorder {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                caps: Capabilities::READ_WRITE,
                ..Self::default()
            }
        }

        fn log(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Backend for Recorder {
        fn name(&self) -> &str {
            &self.name
        }
        fn capabilities(&self) -> Capabilities {
            self.caps
        }
        fn begin_write(&mut self) -> Result<(), BackendError> {
            self.log("begin_write".to_string());
            if self.fail_begin_write {
                return Err(BackendError::NotOpen(self.name.clone()));
            }
            Ok(())
        }
        fn write_data(&mut self, channel: &str, value: &Value) -> Result<(), BackendError> {
            self.log(format!("write {channel}={value}"));
            if self.fail_write_for.as_deref() == Some(channel) {
                return Err(BackendError::Format(channel.to_string()));
            }
            Ok(())
        }
        fn end_write(&mut self) -> Result<(), BackendError> {
            self.log("end_write".to_string());
            Ok(())
        }
        fn begin_read(&mut self) -> Result<(), BackendError> {
            self.log("begin_read".to_string());
            if self.fail_begin_read {
                return Err(BackendError::NotOpen(self.name.clone()));
            }
            Ok(())
        }
        fn read_data(&mut self) -> Result<HashMap<String, Value>, BackendError> {
            self.log("read_data".to_string());
            Ok(self.stored.clone())
        }
        fn end_read(&mut self) -> Result<(), BackendError> {
            self.log("end_read".to_string());
            Ok(())
        }
        fn report(&self, out: &mut dyn Write, _indent: usize) -> io::Result<()> {
            writeln!(out, "Recorder {}", self.name)
        }
    }

    fn context(
        registry: &BackendRegistry,
        backends: &[&str],
        channels: &[&str],
    ) -> SaveContext {
        let mut set = MonitorSet::new("M", Duration::from_secs(10));
        for name in backends {
            set.push_backend(BackendRef {
                name: name.to_string(),
                backend: registry.get(name).unwrap(),
            });
        }
        for channel in channels {
            set.push_pattern(channel.to_string());
        }
        SaveContext::new(set)
    }

    #[test]
    fn test_resolve_once() {
        let source = MemoryChannelSource::with_channels([("A", Value::Int32(1))]);
        let registry = BackendRegistry::new();
        let mut ctx = context(&registry, &[], &["A", "MISSING"]);
        assert!(!ctx.is_resolved());
        assert_eq!(ctx.resolve(&source), 1);
        source.insert("MISSING", Value::Int32(2));
        assert_eq!(ctx.resolve(&source), 1);
        assert!(ctx.is_resolved());
    }

    #[test]
    fn test_save_with_failing_channel_writes_the_rest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.sav");
        let mut registry = BackendRegistry::new();
        registry
            .register(FileBackend::new("P", &path, FileFormat::Text))
            .unwrap();

        let source = MemoryChannelSource::with_channels([
            ("A", Value::Int32(1)),
            ("B", Value::Int32(2)),
            ("C", Value::Int32(3)),
        ]);
        source.set_online("B", false);

        let mut ctx = context(&registry, &["P"], &["A", "B", "C"]);
        ctx.resolve(&source);
        let report = ctx.save(&source);

        assert_eq!(report.status, SaveStatus::Failed);
        assert_ne!(report.status.code(), 0);
        assert_eq!(report.channels, 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.failed_channels, ["B"]);
        assert!(report.failed_backends.is_empty());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "A int32_t 1\nC int32_t 3\n"
        );
        assert_eq!(ctx.last_status(), SaveStatus::Failed);
        assert!(ctx.last_save().is_some());
    }

    #[test]
    fn test_save_skips_backend_failing_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("good.sav");
        let mut registry = BackendRegistry::new();
        let mut broken = Recorder::new("broken");
        broken.fail_begin_write = true;
        registry.register(broken).unwrap();
        registry
            .register(FileBackend::new("good", &path, FileFormat::Text))
            .unwrap();

        let source = MemoryChannelSource::with_channels([("X", Value::Int32(42))]);
        let mut ctx = context(&registry, &["broken", "good"], &["X"]);
        ctx.resolve(&source);
        let report = ctx.save(&source);

        assert_eq!(report.status, SaveStatus::Failed);
        assert_eq!(report.failed_backends, ["broken"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "X int32_t 42\n");
    }

    #[test]
    fn test_end_write_called_after_write_failure() {
        let mut registry = BackendRegistry::new();
        let mut rec = Recorder::new("rec");
        rec.fail_write_for = Some("A".to_string());
        let events = Arc::clone(&rec.events);
        registry.register(rec).unwrap();

        let source =
            MemoryChannelSource::with_channels([("A", Value::Int8(1)), ("B", Value::Int8(2))]);
        let mut ctx = context(&registry, &["rec"], &["A", "B"]);
        ctx.resolve(&source);
        let report = ctx.save(&source);

        assert_eq!(report.status, SaveStatus::Failed);
        assert_eq!(report.failed_backends, ["rec"]);
        assert_eq!(
            *events.lock().unwrap(),
            ["begin_write", "write A=1", "write B=2", "end_write"]
        );
    }

    #[test]
    fn test_failed_begin_write_skips_end_write() {
        let mut registry = BackendRegistry::new();
        let mut rec = Recorder::new("rec");
        rec.fail_begin_write = true;
        let events = Arc::clone(&rec.events);
        registry.register(rec).unwrap();

        let source = MemoryChannelSource::with_channels([("A", Value::Int8(1))]);
        let mut ctx = context(&registry, &["rec"], &["A"]);
        ctx.resolve(&source);
        ctx.save(&source);

        assert_eq!(*events.lock().unwrap(), ["begin_write"]);
    }

    #[test]
    fn test_save_ok_status() {
        let dir = tempdir().unwrap();
        let mut registry = BackendRegistry::new();
        registry
            .register(FileBackend::new(
                "P",
                dir.path().join("m.json"),
                FileFormat::Json,
            ))
            .unwrap();
        let source = MemoryChannelSource::with_channels([("Y", Value::from("hello world"))]);
        let mut ctx = context(&registry, &["P"], &["Y"]);
        assert_eq!(ctx.last_status(), SaveStatus::Never);
        ctx.resolve(&source);

        let report = ctx.save(&source);
        assert_eq!(report.status, SaveStatus::Ok);
        assert_eq!(report.status.code(), 0);
        assert_eq!(ctx.status().last_status, SaveStatus::Ok);
    }

    #[test]
    fn test_restore_first_backend_with_data_wins() {
        let mut registry = BackendRegistry::new();
        let mut unreachable = Recorder::new("unreachable");
        unreachable.fail_begin_read = true;
        registry.register(unreachable).unwrap();
        registry.register(Recorder::new("empty")).unwrap();
        let mut first = Recorder::new("first");
        first.stored.insert("X".to_string(), Value::Int32(42));
        registry.register(first).unwrap();
        let mut second = Recorder::new("second");
        second.stored.insert("X".to_string(), Value::Int32(99));
        let second_events = Arc::clone(&second.events);
        registry.register(second).unwrap();

        let source = MemoryChannelSource::with_channels([("X", Value::Int32(7))]);
        let mut ctx = context(
            &registry,
            &["unreachable", "empty", "first", "second"],
            &["X"],
        );
        ctx.resolve(&source);
        let outcome = ctx.restore(&source);

        assert_eq!(outcome.backend.as_deref(), Some("first"));
        assert_eq!(outcome.restored, 1);
        assert_eq!(outcome.status, SaveStatus::Ok);
        assert_eq!(source.value("X"), Some(Value::Int32(42)));
        assert!(ctx.is_restored());
        assert!(second_events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_restore_skips_write_only_backend() {
        let mut registry = BackendRegistry::new();
        let mut write_only = Recorder::new("wo");
        write_only.caps = Capabilities::WRITE;
        write_only.stored.insert("X".to_string(), Value::Int32(1));
        registry.register(write_only).unwrap();

        let source = MemoryChannelSource::with_channels([("X", Value::Int32(7))]);
        let mut ctx = context(&registry, &["wo"], &["X"]);
        ctx.resolve(&source);
        let outcome = ctx.restore(&source);

        assert_eq!(outcome.backend, None);
        assert_eq!(outcome.status, SaveStatus::Failed);
        assert_eq!(source.value("X"), Some(Value::Int32(7)));
    }

    #[test]
    fn test_restore_leaves_absent_channels_untouched() {
        let mut registry = BackendRegistry::new();
        let mut rec = Recorder::new("rec");
        rec.stored.insert("A".to_string(), Value::Int32(10));
        rec.stored.insert("UNKNOWN".to_string(), Value::Int32(0));
        registry.register(rec).unwrap();

        let source =
            MemoryChannelSource::with_channels([("A", Value::Int32(1)), ("B", Value::Int32(2))]);
        let mut ctx = context(&registry, &["rec"], &["A", "B"]);
        ctx.resolve(&source);
        let outcome = ctx.restore(&source);

        assert_eq!(outcome.restored, 1);
        assert_eq!(source.value("A"), Some(Value::Int32(10)));
        assert_eq!(source.value("B"), Some(Value::Int32(2)));
    }

    #[test]
    fn test_restore_records_put_failures() {
        let mut registry = BackendRegistry::new();
        let mut rec = Recorder::new("rec");
        rec.stored.insert("A".to_string(), Value::from("text"));
        rec.stored.insert("B".to_string(), Value::Int32(5));
        registry.register(rec).unwrap();

        let source =
            MemoryChannelSource::with_channels([("A", Value::Int32(1)), ("B", Value::Int32(2))]);
        let mut ctx = context(&registry, &["rec"], &["A", "B"]);
        ctx.resolve(&source);
        let outcome = ctx.restore(&source);

        assert_eq!(outcome.restored, 1);
        assert_eq!(outcome.failed_channels, ["A"]);
        assert_eq!(outcome.status, SaveStatus::Failed);
        assert_eq!(source.value("B"), Some(Value::Int32(5)));
    }

    #[test]
    fn test_remaining_and_stamp() {
        let registry = BackendRegistry::new();
        let mut ctx = context(&registry, &[], &[]);
        let t0 = Instant::now();
        assert_eq!(ctx.remaining(t0), Duration::from_secs(10));
        ctx.stamp(t0);
        assert!(ctx.is_stamped());
        assert_eq!(ctx.remaining(t0 + Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(ctx.remaining(t0 + Duration::from_secs(12)), Duration::ZERO);
    }

    #[test]
    fn test_status_ordering() {
        assert!(SaveStatus::Failed > SaveStatus::Ok);
        assert!(SaveStatus::Ok > SaveStatus::Never);
        assert_eq!(SaveStatus::Never.to_string(), "never");
    }
}
