//! In-memory channel source.
//!
//! Holds a table of named channels in process memory. Used by the test suite
//! and by `pvsave run` to simulate a control system.
//!
//! Patterns passed to [`ChannelSource::connect`] are either literal names or
//! globs using `*` (any run of characters) and `?` (one character).

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

use regex::Regex;

use crate::channel::{ChannelError, ChannelHandle, ChannelSource};
use crate::value::Value;

#[derive(Debug)]
struct Slot {
    token: u64,
    value: Value,
    online: bool,
}

#[derive(Debug, Default)]
struct Table {
    slots: BTreeMap<String, Slot>,
    next_token: u64,
}

/// Thread-safe in-memory channel table.
#[derive(Debug, Default)]
pub struct MemoryChannelSource {
    table: RwLock<Table>,
}

impl MemoryChannelSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-populated with channels.
    pub fn with_channels<I, K>(channels: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let source = Self::new();
        for (name, value) in channels {
            source.insert(name, value);
        }
        source
    }

    /// Add a channel or overwrite an existing channel's value.
    ///
    /// Overwriting keeps the channel's token and online state.
    pub fn insert(&self, name: impl Into<String>, value: Value) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let name = name.into();
        if let Some(slot) = table.slots.get_mut(&name) {
            slot.value = value;
            return;
        }
        table.next_token += 1;
        let token = table.next_token;
        table.slots.insert(
            name,
            Slot {
                token,
                value,
                online: true,
            },
        );
    }

    /// Current value of a channel by name.
    pub fn value(&self, name: &str) -> Option<Value> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.slots.get(name).map(|slot| slot.value.clone())
    }

    /// Mark a channel reachable or unreachable.
    ///
    /// Offline channels fail `get` and `put` with [`ChannelError::Disconnected`].
    pub fn set_online(&self, name: &str, online: bool) -> bool {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        match table.slots.get_mut(name) {
            Some(slot) => {
                slot.online = online;
                true
            }
            None => false,
        }
    }

    /// Channel names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.slots.keys().cloned().collect()
    }

    fn with_slot<R>(
        &self,
        channel: &ChannelHandle,
        f: impl FnOnce(&mut Slot) -> Result<R, ChannelError>,
    ) -> Result<R, ChannelError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let slot = table
            .slots
            .get_mut(&channel.name)
            .filter(|slot| slot.token == channel.token)
            .ok_or_else(|| ChannelError::NotFound(channel.name.clone()))?;
        if !slot.online {
            return Err(ChannelError::Disconnected(channel.name.clone()));
        }
        f(slot)
    }
}

impl ChannelSource for MemoryChannelSource {
    fn connect(&self, patterns: &[String]) -> Vec<ChannelHandle> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();
        let mut handles = Vec::new();

        for pattern in patterns {
            let matched: Vec<(&String, &Slot)> = if is_glob(pattern) {
                match glob_to_regex(pattern) {
                    Ok(re) => table
                        .slots
                        .iter()
                        .filter(|(name, _)| re.is_match(name))
                        .collect(),
                    Err(e) => {
                        tracing::warn!(pattern = %pattern, error = %e, "Invalid channel pattern");
                        continue;
                    }
                }
            } else {
                table.slots.get_key_value(pattern).into_iter().collect()
            };

            if matched.is_empty() {
                tracing::warn!(pattern = %pattern, "Channel pattern matched nothing");
                continue;
            }

            for (name, slot) in matched {
                if seen.insert(name.clone()) {
                    handles.push(ChannelHandle::new(name.clone(), slot.token));
                }
            }
        }

        tracing::debug!(
            patterns = patterns.len(),
            connected = handles.len(),
            "Channels connected"
        );
        handles
    }

    fn get(&self, channel: &ChannelHandle) -> Result<Value, ChannelError> {
        self.with_slot(channel, |slot| Ok(slot.value.clone()))
    }

    fn put(&self, channel: &ChannelHandle, value: &Value) -> Result<(), ChannelError> {
        self.with_slot(channel, |slot| {
            if let Some(expected) = slot.value.value_type()
                && !slot.value.same_type(value)
            {
                return Err(ChannelError::TypeMismatch {
                    channel: channel.name.clone(),
                    expected,
                    actual: value
                        .value_type()
                        .map_or_else(|| "empty".to_string(), |t| t.to_string()),
                });
            }
            slot.value.clone_from(value);
            Ok(())
        })
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Compile a `*` / `?` glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}
