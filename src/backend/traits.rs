//! Core backend trait and capability flags.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::BackendError;
use crate::value::Value;

/// Directions a backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
}

impl Capabilities {
    pub const READ: Self = Self {
        read: true,
        write: false,
    };
    pub const WRITE: Self = Self {
        read: false,
        write: true,
    };
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.read {
            f.write_str("r")?;
        }
        if self.write {
            f.write_str("w")?;
        }
        Ok(())
    }
}

/// A persistence target for channel snapshots.
///
/// # Transactions
///
/// Writes are streamed: `begin_write`, then `write_data` once per channel,
/// then `end_write`. Reads return the whole store at once: `begin_read`,
/// `read_data`, `end_read`. Callers always invoke `end_*` after a successful
/// `begin_*`, even when intermediate calls fail, and may open and close the
/// same backend any number of times.
///
/// Implementations only need `Send`; all access is serialized by the caller.
pub trait Backend: Send + 'static {
    /// Instance name used in configuration and logs.
    fn name(&self) -> &str;

    /// Supported directions.
    fn capabilities(&self) -> Capabilities;

    /// Open a write transaction, discarding any previous snapshot.
    fn begin_write(&mut self) -> Result<(), BackendError>;

    /// Persist one channel's value.
    fn write_data(&mut self, channel: &str, value: &Value) -> Result<(), BackendError>;

    /// Finish the write transaction.
    fn end_write(&mut self) -> Result<(), BackendError>;

    /// Open a read transaction.
    fn begin_read(&mut self) -> Result<(), BackendError>;

    /// Read every stored channel.
    ///
    /// Malformed records are skipped (and logged), not reported as errors.
    fn read_data(&mut self) -> Result<HashMap<String, Value>, BackendError>;

    /// Finish the read transaction.
    fn end_read(&mut self) -> Result<(), BackendError>;

    /// Write a human-readable description, indented by `indent` spaces.
    fn report(&self, out: &mut dyn Write, indent: usize) -> io::Result<()>;
}

/// Backend shared between monitor sets.
pub type SharedBackend = Arc<Mutex<dyn Backend>>;

/// Lock a shared backend, recovering from poisoning.
pub fn lock_backend(backend: &SharedBackend) -> MutexGuard<'_, dyn Backend> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write `indent` spaces.
pub fn pindent(out: &mut dyn Write, indent: usize) -> io::Result<()> {
    write!(out, "{:indent$}", "")
}
