//! Process lifecycle integration.
//!
//! [`PvSave`] owns the save contexts, the backends and the scheduler. The host
//! reports lifecycle stages in order; each stage restores the monitor sets
//! configured for it, and the final stage starts the periodic scheduler.
//!
//! ```rust,ignore
//! let registry = config.build_registry()?;
//! let mut pvsave = PvSave::new(registry, source);
//! pvsave.on_stage(RestoreStage::AfterChannelInit)?;
//! pvsave.on_stage(RestoreStage::AfterDatabaseInit)?;
//! pvsave.on_stage(RestoreStage::AfterRunning)?; // scheduler running
//! ```

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::backend::{BackendRegistry, pindent};
use crate::channel::ChannelSource;
use crate::config::DEFAULT_THREAD_NAME;
use crate::monitor::{
    ContextStatus, Registry, RestoreOutcome, RestoreStage, SaveContext, SaveReport, SaveStatus,
    SharedContexts, lock_contexts, save_all,
};
use crate::scheduler::{SchedulerError, SchedulerHandle};

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A stage was reported twice or after a later stage.
    #[error("stage {stage} reported out of order (current: {current})")]
    StageOutOfOrder {
        stage: RestoreStage,
        current: RestoreStage,
    },

    /// Scheduler failure.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Save/restore engine bound to one channel source.
pub struct PvSave {
    source: Arc<dyn ChannelSource>,
    contexts: SharedContexts,
    backends: BackendRegistry,
    min_period: Duration,
    thread_name: String,
    stage: Option<RestoreStage>,
    scheduler: Option<SchedulerHandle>,
}

impl std::fmt::Debug for PvSave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvSave")
            .field("backends", &self.backends)
            .field("stage", &self.stage)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl PvSave {
    /// Freeze the registry into save contexts.
    pub fn new(registry: Registry, source: Arc<dyn ChannelSource>) -> Self {
        let (sets, backends, min_period) = registry.into_parts();
        let contexts: Vec<SaveContext> = sets.into_iter().map(SaveContext::new).collect();
        Self {
            source,
            contexts: Arc::new(Mutex::new(contexts)),
            backends,
            min_period,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stage: None,
            scheduler: None,
        }
    }

    /// Name of the scheduler thread.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Last stage reported.
    pub fn stage(&self) -> Option<RestoreStage> {
        self.stage
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.as_ref().is_some_and(SchedulerHandle::is_running)
    }

    /// Handle a lifecycle stage.
    ///
    /// The first call resolves every monitor set's channels. Each call
    /// restores the not-yet-restored sets configured for `stage` or any
    /// earlier stage, so a skipped hook still restores its sets. The final
    /// stage then starts the scheduler.
    ///
    /// # Errors
    /// `StageOutOfOrder` if `stage` is not later than the previous one,
    /// `Scheduler` if the scheduler thread cannot be started.
    pub fn on_stage(&mut self, stage: RestoreStage) -> Result<Vec<RestoreOutcome>, LifecycleError> {
        if let Some(current) = self.stage
            && stage <= current
        {
            return Err(LifecycleError::StageOutOfOrder { stage, current });
        }
        let first = self.stage.is_none();
        self.stage = Some(stage);
        tracing::info!(stage = %stage, "Lifecycle stage reached");

        let outcomes = {
            let mut contexts = lock_contexts(&self.contexts);
            if first {
                for ctx in contexts.iter_mut() {
                    ctx.resolve(self.source.as_ref());
                }
            }
            contexts
                .iter_mut()
                .filter(|ctx| ctx.set().stage() <= stage && !ctx.is_restored())
                .map(|ctx| ctx.restore(self.source.as_ref()))
                .collect()
        };

        if stage == RestoreStage::FINAL {
            self.start_scheduler()?;
        }
        Ok(outcomes)
    }

    /// Report every remaining stage in order.
    pub fn run_all_stages(&mut self) -> Result<Vec<RestoreOutcome>, LifecycleError> {
        let current = self.stage;
        let mut outcomes = Vec::new();
        for stage in RestoreStage::iter().filter(|s| current.is_none_or(|c| *s > c)) {
            outcomes.extend(self.on_stage(stage)?);
        }
        Ok(outcomes)
    }

    fn start_scheduler(&mut self) -> Result<(), LifecycleError> {
        if self.scheduler.is_some() {
            return Ok(());
        }
        let handle = SchedulerHandle::start(
            Arc::clone(&self.contexts),
            Arc::clone(&self.source),
            &self.thread_name,
            self.min_period,
        )?;
        self.scheduler = Some(handle);
        Ok(())
    }

    /// Save every monitor set now.
    ///
    /// Runs on the scheduler thread when it is running, otherwise directly
    /// under the same lock.
    pub fn save_all_now(&self) -> Result<Vec<SaveReport>, LifecycleError> {
        if let Some(scheduler) = &self.scheduler {
            return Ok(scheduler.save_now()?);
        }
        let mut contexts = lock_contexts(&self.contexts);
        Ok(save_all(&mut contexts, self.source.as_ref(), Instant::now()))
    }

    /// Bookkeeping of every monitor set, in creation order.
    pub fn status(&self) -> Vec<ContextStatus> {
        lock_contexts(&self.contexts)
            .iter()
            .map(SaveContext::status)
            .collect()
    }

    /// Time of the last save of set `index`, or the most recent save of any
    /// set when `index` is `None`.
    pub fn last_save_time(&self, index: Option<usize>) -> Option<DateTime<Utc>> {
        let contexts = lock_contexts(&self.contexts);
        match index {
            Some(i) => contexts.get(i).and_then(SaveContext::last_save),
            None => contexts.iter().filter_map(SaveContext::last_save).max(),
        }
    }

    /// Status of the last save of set `index`, or the worst status over all
    /// sets when `index` is `None`.
    ///
    /// An out-of-range index reports [`SaveStatus::Never`].
    pub fn last_status(&self, index: Option<usize>) -> SaveStatus {
        let contexts = lock_contexts(&self.contexts);
        match index {
            Some(i) => contexts
                .get(i)
                .map_or(SaveStatus::Never, SaveContext::last_status),
            None => contexts
                .iter()
                .map(SaveContext::last_status)
                .max()
                .unwrap_or_default(),
        }
    }

    /// Write the runtime state of every monitor set and backend.
    pub fn report(&self, out: &mut dyn Write) -> io::Result<()> {
        let stage = self.stage.map_or_else(|| "none".to_string(), |s| s.to_string());
        let state = if self.is_running() { "running" } else { "stopped" };
        writeln!(out, "pvsave: stage {stage}, scheduler {state}")?;

        let contexts = lock_contexts(&self.contexts);
        writeln!(out, "Monitor sets ({}):", contexts.len())?;
        for ctx in contexts.iter() {
            let status = ctx.status();
            pindent(out, 2)?;
            writeln!(out, "MonitorSet {}", status.name)?;
            pindent(out, 4)?;
            writeln!(out, "period: {}", humantime::format_duration(status.period))?;
            pindent(out, 4)?;
            writeln!(out, "stage: {}", status.stage)?;
            pindent(out, 4)?;
            writeln!(out, "channels: {}", status.channels)?;
            pindent(out, 4)?;
            match status.last_save {
                Some(at) => writeln!(out, "last save: {} ({})", at.to_rfc3339(), status.last_status)?,
                None => writeln!(out, "last save: never")?,
            }
            pindent(out, 4)?;
            writeln!(out, "restored: {}", status.restored)?;
        }
        drop(contexts);

        writeln!(out, "Backends ({}):", self.backends.len())?;
        self.backends.report(out, 2)
    }

    /// Stop the scheduler.
    pub fn shutdown(mut self) -> Result<(), LifecycleError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown()?;
            tracing::info!("pvsave stopped");
        }
        Ok(())
    }
}

impl Drop for PvSave {
    fn drop(&mut self) {
        if self.scheduler.is_some() {
            let _ = self.stop();
        }
    }
}
