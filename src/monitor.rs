//! Monitor Layer
//!
//! Static monitor-set configuration and its runtime save contexts.
//!
//! # Components
//!
//! - [`MonitorSet`]: name, period, restore stage, channel patterns, backends
//! - [`Registry`]: administrative surface that builds monitor sets
//! - [`SaveContext`]: resolved channels plus save/restore logic and bookkeeping

mod context;
mod registry;
mod set;

pub use context::{
    ContextStatus, RestoreOutcome, SaveContext, SaveReport, SaveStatus, SharedContexts,
    lock_contexts, save_all,
};
pub use registry::Registry;
pub use set::{BackendRef, DEFAULT_MIN_PERIOD, MonitorSet, RestoreStage};
