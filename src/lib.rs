//! pvsave - Channel Save/Restore Library
//!
//! Periodically snapshots groups of live control-system channels to pluggable
//! backends and writes the last snapshot back when the process restarts.
//!
//! # Architecture
//!
//! - **Value / Codec**: tagged scalar values and their text encoding
//! - **Channel**: access to live channels ([`ChannelSource`])
//! - **Backend**: persistence targets (text and JSON files)
//! - **Monitor**: monitor sets, the administrative [`Registry`] and save contexts
//! - **Scheduler**: a single worker thread running periodic saves
//! - **Lifecycle**: [`PvSave`], stage-driven restore and scheduler start-up
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pvsave::{AppConfig, MemoryChannelSource, PvSave};
//!
//! let config = AppConfig::load("configs/pvsave.yaml")?;
//! let source = Arc::new(MemoryChannelSource::with_channels(config.simulated_channels()?));
//! let mut pvsave = PvSave::new(config.build_registry()?, source);
//! pvsave.run_all_stages()?;
//! ```

pub mod backend;
pub mod channel;
pub mod codec;
pub mod config;
pub mod lifecycle;
pub mod monitor;
pub mod scheduler;
pub mod value;

pub use backend::{
    Backend, BackendError, BackendRegistry, Capabilities, FileBackend, FileFormat, SharedBackend,
};
pub use channel::{ChannelError, ChannelHandle, ChannelSource, MemoryChannelSource};
pub use codec::CodecError;
pub use config::{AppConfig, ConfigError};
pub use lifecycle::{LifecycleError, PvSave};
pub use monitor::{
    ContextStatus, MonitorSet, Registry, RestoreOutcome, RestoreStage, SaveReport, SaveStatus,
};
pub use scheduler::SchedulerError;
pub use value::{Value, ValueType};
