//! Channel source trait and handle types.

use thiserror::Error;

use crate::value::{Value, ValueType};

/// Errors returned by a [`ChannelSource`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No channel with this name.
    #[error("channel not found: {0}")]
    NotFound(String),

    /// The channel exists but cannot be reached.
    #[error("channel disconnected: {0}")]
    Disconnected(String),

    /// The value type does not match the channel's type.
    #[error("type mismatch on {channel}: expected {expected}, got {actual}")]
    TypeMismatch {
        channel: String,
        expected: ValueType,
        actual: String,
    },

    /// Underlying I/O failure.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A resolved channel.
///
/// `token` is owned and interpreted by the source that issued the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    /// Channel name as known to the control system.
    pub name: String,
    /// Source-specific context.
    pub token: u64,
}

impl ChannelHandle {
    /// Create a handle.
    pub fn new(name: impl Into<String>, token: u64) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }
}

/// Access to live channels.
///
/// Calls may block on control-system I/O; the engine never times them out.
pub trait ChannelSource: Send + Sync + 'static {
    /// Resolve patterns to channels.
    ///
    /// Best effort: patterns that match nothing are logged and dropped. The
    /// result keeps pattern order and contains each channel at most once.
    fn connect(&self, patterns: &[String]) -> Vec<ChannelHandle>;

    /// Read the current value of a channel.
    fn get(&self, channel: &ChannelHandle) -> Result<Value, ChannelError>;

    /// Write a value to a channel.
    fn put(&self, channel: &ChannelHandle, value: &Value) -> Result<(), ChannelError>;
}
