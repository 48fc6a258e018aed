//! Line-oriented text store format.
//!
//! One record per line: `<name> <typename> <value>`. Blank lines and lines
//! starting with `#` are ignored. The value is the rest of the line, so quoted
//! strings may contain spaces.
//!
//! ```text
//! # pvsave snapshot
//! IOC:MODE int32_t 1
//! IOC:LABEL string "beam on"
//! ```

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::value::Value;

/// Why a single record was skipped.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Field absent from the record.
    #[error("missing {0}")]
    MissingField(&'static str),

    /// Type or value could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Streams records to a writer.
#[derive(Debug)]
pub struct TextWriter<W: Write> {
    inner: W,
}

impl<W: Write> TextWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one record line.
    pub fn write_record(&mut self, name: &str, value: &Value) -> io::Result<()> {
        let Some(ty) = value.value_type() else {
            return Ok(());
        };
        writeln!(self.inner, "{} {} {}", name, ty, codec::encode(value))
    }

    /// Flush and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Parse one non-comment line into a record.
pub fn parse_line(line: &str) -> Result<(String, Value), RecordError> {
    let line = line.trim();
    let (name, rest) = line
        .split_once(char::is_whitespace)
        .ok_or(RecordError::MissingField("type"))?;
    let (type_name, value) = rest
        .trim_start()
        .split_once(char::is_whitespace)
        .ok_or(RecordError::MissingField("value"))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(RecordError::MissingField("value"));
    }
    let value = codec::decode_typed(type_name, value)?;
    Ok((name.to_string(), value))
}

/// Read every valid record. `origin` names the source in log messages.
///
/// Malformed lines are skipped with a warning; only I/O failures are errors.
pub fn read_records<R: BufRead>(reader: R, origin: &str) -> io::Result<HashMap<String, Value>> {
    let mut records = HashMap::new();

    for (idx, raw) in reader.split(b'\n').enumerate() {
        let line = match String::from_utf8(raw?) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(origin, line = idx + 1, error = %e, "Skipping malformed record");
                continue;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_line(trimmed) {
            Ok((name, value)) => {
                if records.insert(name.clone(), value).is_some() {
                    tracing::debug!(origin, line = idx + 1, channel = %name, "Duplicate record, keeping last");
                }
            }
            Err(e) => {
                tracing::warn!(origin, line = idx + 1, error = %e, "Skipping malformed record");
            }
        }
    }

    Ok(records)
}
