//! File-system backend.
//!
//! Stores one snapshot per file in either the text or JSON format. Every write
//! transaction truncates the file and rewrites the whole snapshot; this is not
//! an append log.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::backend::json::JsonWriter;
use crate::backend::text::TextWriter;
use crate::backend::{Backend, BackendError, Capabilities, json, pindent, text};
use crate::value::Value;

/// On-disk encoding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileFormat {
    /// `<name> <type> <value>` lines.
    #[default]
    Text,
    /// Single JSON object.
    Json,
}

enum Writer {
    Text(TextWriter<BufWriter<File>>),
    Json(JsonWriter<BufWriter<File>>),
}

/// Snapshot file in text or JSON format.
pub struct FileBackend {
    name: String,
    path: PathBuf,
    format: FileFormat,
    writer: Option<Writer>,
    reader: Option<BufReader<File>>,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("format", &self.format)
            .field("writing", &self.writer.is_some())
            .field("reading", &self.reader.is_some())
            .finish()
    }
}

impl FileBackend {
    /// Create a backend. The file is not touched until the first transaction.
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>, format: FileFormat) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            format,
            writer: None,
            reader: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn open_for_write(&self) -> io::Result<BufWriter<File>> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(BufWriter::new(file))
    }
}

impl Backend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_WRITE
    }

    fn begin_write(&mut self) -> Result<(), BackendError> {
        if self.writer.take().is_some() {
            tracing::warn!(backend = %self.name, "Previous write transaction left open, discarding");
        }
        let out = self.open_for_write().inspect_err(|e| {
            tracing::error!(backend = %self.name, path = %self.path.display(), error = %e, "Failed to open store for writing");
        })?;
        self.writer = Some(match self.format {
            FileFormat::Text => Writer::Text(TextWriter::new(out)),
            FileFormat::Json => Writer::Json(JsonWriter::begin(out)?),
        });
        Ok(())
    }

    fn write_data(&mut self, channel: &str, value: &Value) -> Result<(), BackendError> {
        if value.is_empty() {
            tracing::debug!(backend = %self.name, channel, "Skipping empty value");
            return Ok(());
        }
        match self.writer.as_mut() {
            Some(Writer::Text(w)) => w.write_record(channel, value)?,
            Some(Writer::Json(w)) => w.write_record(channel, value)?,
            None => return Err(BackendError::NotOpen(self.name.clone())),
        }
        Ok(())
    }

    fn end_write(&mut self) -> Result<(), BackendError> {
        match self.writer.take() {
            Some(Writer::Text(w)) => {
                w.finish()?;
            }
            Some(Writer::Json(w)) => {
                w.finish()?;
            }
            None => return Err(BackendError::NotOpen(self.name.clone())),
        }
        tracing::debug!(backend = %self.name, path = %self.path.display(), "Snapshot written");
        Ok(())
    }

    fn begin_read(&mut self) -> Result<(), BackendError> {
        let file = File::open(&self.path).inspect_err(|e| {
            tracing::warn!(backend = %self.name, path = %self.path.display(), error = %e, "Failed to open store for reading");
        })?;
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    fn read_data(&mut self) -> Result<HashMap<String, Value>, BackendError> {
        let origin = self.origin();
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| BackendError::NotOpen(self.name.clone()))?;
        let records = match self.format {
            FileFormat::Text => text::read_records(reader, &origin)?,
            FileFormat::Json => json::read_records(reader, &origin)?,
        };
        tracing::debug!(backend = %self.name, records = records.len(), "Snapshot read");
        Ok(records)
    }

    fn end_read(&mut self) -> Result<(), BackendError> {
        self.reader
            .take()
            .map(drop)
            .ok_or_else(|| BackendError::NotOpen(self.name.clone()))
    }

    fn report(&self, out: &mut dyn Write, indent: usize) -> io::Result<()> {
        pindent(out, indent)?;
        writeln!(out, "FileBackend {}", self.name)?;
        pindent(out, indent + 2)?;
        writeln!(out, "path: {}", self.path.display())?;
        pindent(out, indent + 2)?;
        writeln!(out, "format: {}", self.format)?;
        pindent(out, indent + 2)?;
        writeln!(out, "flags: {}", self.capabilities())
    }
}

/// Read a whole snapshot in one transaction.
pub fn load_snapshot(
    path: impl AsRef<Path>,
    format: FileFormat,
) -> Result<HashMap<String, Value>, BackendError> {
    let mut backend = FileBackend::new("snapshot", path, format);
    backend.begin_read()?;
    let records = backend.read_data();
    backend.end_read()?;
    records
}
