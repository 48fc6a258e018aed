//! Save actor: one thread, one command channel, one periodic loop.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::channel::ChannelSource;
use crate::monitor::{SaveContext, SaveReport, SharedContexts, lock_contexts, save_all};
use crate::scheduler::SchedulerError;

// =============================================================================
// Constants
// =============================================================================

/// Pending commands before senders block.
const CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the save actor.
#[derive(Debug)]
pub enum Command {
    /// Save every context immediately and reply with the reports.
    SaveNow { reply: SyncSender<Vec<SaveReport>> },
    /// Graceful shutdown.
    Shutdown,
}

// =============================================================================
// Step function
// =============================================================================

/// Save every context that is due at `now` and compute the next wait.
///
/// Contexts never stamped before start their first period at `now`. The wait
/// is the shortest remaining time over all contexts, or `idle_wait` when
/// there are none.
pub fn poll(
    contexts: &mut [SaveContext],
    source: &dyn ChannelSource,
    now: Instant,
    idle_wait: Duration,
) -> (Vec<SaveReport>, Duration) {
    let mut reports = Vec::new();
    let mut next: Option<Duration> = None;

    for ctx in contexts.iter_mut() {
        if !ctx.is_stamped() {
            ctx.stamp(now);
        }
        let mut remaining = ctx.remaining(now);
        if remaining.is_zero() {
            reports.push(ctx.save(source));
            ctx.stamp(now);
            remaining = ctx.set().period();
        }
        next = Some(next.map_or(remaining, |n| n.min(remaining)));
    }

    (reports, next.unwrap_or(idle_wait))
}

// =============================================================================
// Actor
// =============================================================================

/// Periodic save worker.
pub struct SaveActor {
    contexts: SharedContexts,
    source: Arc<dyn ChannelSource>,
    rx: Receiver<Command>,
    idle_wait: Duration,
}

impl SaveActor {
    /// Spawn the actor on a named thread.
    pub fn spawn(
        contexts: SharedContexts,
        source: Arc<dyn ChannelSource>,
        thread_name: &str,
        idle_wait: Duration,
    ) -> Result<(JoinHandle<()>, SyncSender<Command>), SchedulerError> {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        let mut actor = SaveActor {
            contexts,
            source,
            rx,
            idle_wait,
        };
        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || actor.run())
            .map_err(SchedulerError::Spawn)?;
        Ok((handle, tx))
    }

    fn run(&mut self) {
        tracing::info!(thread = ?thread::current().name(), "Save scheduler started");

        let mut wait = self.tick(Instant::now());
        loop {
            match self.rx.recv_timeout(wait) {
                Ok(cmd) => {
                    if self.handle_command(cmd) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Channel disconnected, shutting down");
                    break;
                }
            }
            wait = self.tick(Instant::now());
        }

        tracing::info!("Save scheduler stopped");
    }

    fn tick(&self, now: Instant) -> Duration {
        let mut contexts = lock_contexts(&self.contexts);
        let (reports, wait) = poll(&mut contexts, self.source.as_ref(), now, self.idle_wait);
        for report in &reports {
            if !report.status.is_ok() {
                tracing::warn!(
                    monitor_set = %report.monitor_set,
                    failed_channels = report.failed_channels.len(),
                    failed_backends = report.failed_backends.len(),
                    "Periodic save completed with failures"
                );
            }
        }
        tracing::trace!(wait = ?wait, "Next wake-up");
        wait
    }

    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SaveNow { reply } => {
                let reports = {
                    let mut contexts = lock_contexts(&self.contexts);
                    save_all(&mut contexts, self.source.as_ref(), Instant::now())
                };
                tracing::info!(monitor_sets = reports.len(), "Explicit save complete");
                if reply.send(reports).is_err() {
                    tracing::debug!("Save requester went away before the reply");
                }
            }
            Command::Shutdown => {
                tracing::info!("Shutdown requested");
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRegistry, FileBackend, FileFormat};
    use crate::channel::MemoryChannelSource;
    use crate::monitor::{BackendRef, MonitorSet, SaveStatus};
    use crate::scheduler::SchedulerHandle;
    use crate::value::Value;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn context(name: &str, period: Duration) -> SaveContext {
        SaveContext::new(MonitorSet::new(name, period))
    }

    fn saved(reports: &[SaveReport]) -> Vec<&str> {
        reports.iter().map(|r| r.monitor_set.as_str()).collect()
    }

    #[test]
    fn test_poll_independent_periods() {
        let source = MemoryChannelSource::new();
        let mut contexts = vec![
            context("ten", Duration::from_secs(10)),
            context("fifteen", Duration::from_secs(15)),
        ];
        let idle = Duration::from_secs(10);
        let t0 = Instant::now();
        let at = |secs: u64| t0 + Duration::from_secs(secs);

        let (reports, wait) = poll(&mut contexts, &source, t0, idle);
        assert!(reports.is_empty());
        assert_eq!(wait, Duration::from_secs(10));

        let (reports, wait) = poll(&mut contexts, &source, at(10), idle);
        assert_eq!(saved(&reports), ["ten"]);
        assert_eq!(wait, Duration::from_secs(5));

        let (reports, wait) = poll(&mut contexts, &source, at(15), idle);
        assert_eq!(saved(&reports), ["fifteen"]);
        assert_eq!(wait, Duration::from_secs(5));

        let (reports, wait) = poll(&mut contexts, &source, at(20), idle);
        assert_eq!(saved(&reports), ["ten"]);
        assert_eq!(wait, Duration::from_secs(10));

        let (reports, _) = poll(&mut contexts, &source, at(30), idle);
        assert_eq!(saved(&reports), ["ten", "fifteen"]);
    }

    #[test]
    fn test_poll_early_wake_saves_nothing() {
        let source = MemoryChannelSource::new();
        let mut contexts = vec![context("ten", Duration::from_secs(10))];
        let t0 = Instant::now();
        poll(&mut contexts, &source, t0, Duration::from_secs(10));

        let (reports, wait) = poll(
            &mut contexts,
            &source,
            t0 + Duration::from_secs(3),
            Duration::from_secs(10),
        );
        assert!(reports.is_empty());
        assert_eq!(wait, Duration::from_secs(7));
    }

    #[test]
    fn test_poll_without_contexts_uses_idle_wait() {
        let source = MemoryChannelSource::new();
        let (reports, wait) = poll(&mut [], &source, Instant::now(), Duration::from_secs(42));
        assert!(reports.is_empty());
        assert_eq!(wait, Duration::from_secs(42));
    }

    fn shared_context(dir: &std::path::Path, period: Duration) -> SharedContexts {
        let mut registry = BackendRegistry::new();
        let backend = registry
            .register(FileBackend::new("P", dir.join("m.sav"), FileFormat::Text))
            .unwrap();
        let mut set = MonitorSet::new("M", period);
        set.push_pattern("X".to_string());
        set.push_backend(BackendRef {
            name: "P".to_string(),
            backend,
        });
        Arc::new(Mutex::new(vec![SaveContext::new(set)]))
    }

    #[test]
    fn test_handle_save_now_and_shutdown() {
        let dir = tempdir().unwrap();
        let source: Arc<MemoryChannelSource> =
            Arc::new(MemoryChannelSource::with_channels([("X", Value::Int32(42))]));
        let contexts = shared_context(dir.path(), Duration::from_secs(3600));
        lock_contexts(&contexts)[0].resolve(&*source);

        let handle = SchedulerHandle::start(
            Arc::clone(&contexts),
            source.clone(),
            "pvsave-test",
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(handle.is_running());

        let reports = handle.save_now().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, SaveStatus::Ok);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("m.sav")).unwrap(),
            "X int32_t 42\n"
        );

        handle.shutdown().unwrap();
    }

    #[test]
    fn test_periodic_save_runs_on_thread() {
        let dir = tempdir().unwrap();
        let source = Arc::new(MemoryChannelSource::with_channels([("X", Value::Int32(1))]));
        let contexts = shared_context(dir.path(), Duration::from_millis(50));
        lock_contexts(&contexts)[0].resolve(&*source);

        let handle = SchedulerHandle::start(
            Arc::clone(&contexts),
            source,
            "pvsave-test",
            Duration::from_millis(50),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while lock_contexts(&contexts)[0].last_save().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        drop(handle);

        assert_eq!(lock_contexts(&contexts)[0].last_status(), SaveStatus::Ok);
        assert!(dir.path().join("m.sav").exists());
    }
}
