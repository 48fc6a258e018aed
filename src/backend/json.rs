//! JSON store format.
//!
//! A single object whose keys are `<name>#<typename>` and whose values are the
//! encoded text form of the channel value, always as a JSON string:
//!
//! ```json
//! {
//! "IOC:MODE#int32_t": "1",
//! "IOC:LABEL#string": "\"beam on\""
//! }
//! ```
//!
//! Entries are emitted incrementally, so a snapshot never has to be held in
//! memory while writing.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::backend::BackendError;
use crate::backend::text::RecordError;
use crate::codec;
use crate::value::Value;

/// Separator between channel name and type name in keys.
pub const KEY_SEPARATOR: char = '#';

/// Streams entries of one JSON object to a writer.
#[derive(Debug)]
pub struct JsonWriter<W: Write> {
    inner: W,
    entries: usize,
    /// Set once a separator reached the writer, even if its entry then failed.
    started: bool,
}

impl<W: Write> JsonWriter<W> {
    /// Start the object.
    pub fn begin(mut inner: W) -> io::Result<Self> {
        inner.write_all(b"{")?;
        Ok(Self {
            inner,
            entries: 0,
            started: false,
        })
    }

    /// Write one entry.
    pub fn write_record(&mut self, name: &str, value: &Value) -> io::Result<()> {
        let Some(ty) = value.value_type() else {
            return Ok(());
        };
        let separator: &[u8] = if self.started { b",\n" } else { b"\n" };
        self.inner.write_all(separator)?;
        self.started = true;

        let key = format!("{name}{KEY_SEPARATOR}{ty}");
        serde_json::to_writer(&mut self.inner, &key)?;
        self.inner.write_all(b": ")?;
        serde_json::to_writer(&mut self.inner, &codec::encode(value))?;
        self.entries += 1;
        Ok(())
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Close the object, flush and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(b"\n}\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Decode one object entry.
pub fn parse_entry(key: &str, value: &serde_json::Value) -> Result<(String, Value), RecordError> {
    let (name, type_name) = key
        .rsplit_once(KEY_SEPARATOR)
        .ok_or(RecordError::MissingField("type suffix"))?;
    if name.is_empty() {
        return Err(RecordError::MissingField("name"));
    }
    let text = value
        .as_str()
        .ok_or(RecordError::MissingField("string value"))?;
    let value = codec::decode_typed(type_name, text)?;
    Ok((name.to_string(), value))
}

/// Read every valid entry. `origin` names the source in log messages.
///
/// # Errors
/// Returns `BackendError::Json` if the input is not valid JSON and
/// `BackendError::Format` if the top level is not an object. Individual bad
/// entries are skipped with a warning.
pub fn read_records<R: Read>(reader: R, origin: &str) -> Result<HashMap<String, Value>, BackendError> {
    let document: serde_json::Value = serde_json::from_reader(reader)?;
    let serde_json::Value::Object(entries) = document else {
        return Err(BackendError::Format(format!(
            "{origin}: top-level JSON value is not an object"
        )));
    };

    let mut records = HashMap::with_capacity(entries.len());
    for (key, value) in &entries {
        match parse_entry(key, value) {
            Ok((name, value)) => {
                records.insert(name, value);
            }
            Err(e) => {
                tracing::warn!(origin, key = %key, error = %e, "Skipping malformed entry");
            }
        }
    }
    Ok(records)
}
