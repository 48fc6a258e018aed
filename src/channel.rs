//! Channel Layer
//!
//! Boundary to the live control system. The persistence engine only talks to
//! channels through the [`ChannelSource`] trait.
//!
//! # Components
//!
//! - [`ChannelSource`]: resolves channel-name patterns and performs get/put
//! - [`ChannelHandle`]: resolved channel, opaque to the engine
//! - [`MemoryChannelSource`]: in-process channel table (tests, simulation)

pub mod memory;
mod traits;

pub use memory::MemoryChannelSource;
pub use traits::{ChannelError, ChannelHandle, ChannelSource};
