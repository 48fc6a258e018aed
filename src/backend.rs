//! Backend Layer
//!
//! Pluggable persistence targets for channel snapshots.
//!
//! # Components
//!
//! - [`Backend`]: read/write transaction contract implemented by I/O modules
//! - [`BackendRegistry`]: name to shared backend mapping
//! - [`FileBackend`]: file store in the text or JSON format
//! - [`diff_records`]: snapshot comparison
//!
//! Backends are shared between monitor sets as [`SharedBackend`] and are not
//! required to be thread-safe themselves; callers serialize access.

mod compare;
mod error;
pub mod file;
pub mod json;
mod registry;
pub mod text;
mod traits;

pub use compare::{RecordDiff, diff_records};
pub use error::BackendError;
pub use file::{FileBackend, FileFormat, load_snapshot};
pub use registry::BackendRegistry;
pub use traits::{Backend, Capabilities, SharedBackend, lock_backend, pindent};
