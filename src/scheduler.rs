//! Save Scheduler
//!
//! One dedicated worker thread runs every monitor set's periodic save.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Command::SaveNow   ┌──────────────────┐
//! │ PvSave       │ ──────────────────► │ SaveActor thread │
//! │ (handle)     │  Command::Shutdown  │ recv_timeout(..) │
//! └──────────────┘                     └────────┬─────────┘
//!                                               │ lock
//!                                      ┌────────▼─────────┐
//!                                      │ SharedContexts   │
//!                                      └──────────────────┘
//! ```
//!
//! The actor sleeps until the earliest context is due, saves every due
//! context under the contexts lock and recomputes the next wake-up. Explicit
//! saves are messages to the same thread, so saves never interleave.

mod actor;

use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelSource;
use crate::monitor::{SaveReport, SharedContexts};

pub use actor::{Command, SaveActor, poll};

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The worker thread could not be started.
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker thread is gone.
    #[error("scheduler channel closed")]
    ChannelClosed,

    /// The worker thread panicked.
    #[error("failed to join scheduler thread")]
    Join,
}

/// Handle to the running scheduler thread.
///
/// Dropping the handle stops the thread.
#[derive(Debug)]
pub struct SchedulerHandle {
    tx: SyncSender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Start the scheduler thread.
    ///
    /// `idle_wait` is the wake-up interval when there are no contexts.
    pub fn start(
        contexts: SharedContexts,
        source: Arc<dyn ChannelSource>,
        thread_name: &str,
        idle_wait: Duration,
    ) -> Result<Self, SchedulerError> {
        let (handle, tx) = SaveActor::spawn(contexts, source, thread_name, idle_wait)?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Save every context now, on the scheduler thread.
    pub fn save_now(&self) -> Result<Vec<SaveReport>, SchedulerError> {
        let (reply, rx) = mpsc::sync_channel(1);
        self.tx
            .send(Command::SaveNow { reply })
            .map_err(|_| SchedulerError::ChannelClosed)?;
        rx.recv().map_err(|_| SchedulerError::ChannelClosed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to finish.
    pub fn shutdown(mut self) -> Result<(), SchedulerError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), SchedulerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // A closed channel means the thread already exited.
        let _ = self.tx.send(Command::Shutdown);
        handle.join().map_err(|_| SchedulerError::Join)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}
