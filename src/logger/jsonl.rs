//! JSONL activity writer: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees a torn record. The file rotates by size.
//! When the file cannot be opened or written the writer degrades to stderr
//! (prefixed `[CLM-JSONL]`) and finally to silent discard; logging never takes
//! the engine down.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::{ClmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Activity event identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EngineStart,
    EngineStop,
    ConfigLoaded,
    LoadStart,
    LoadComplete,
    LoadCancel,
    Rotation,
    FileMissing,
    ReadError,
    PayloadRejected,
    LogSwitch,
    DroppedEvents,
}

/// One activity line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with milliseconds.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Monitored log file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Lines read or classified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<u64>,
    /// Proof events ingested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            path: None,
            lines: None,
            events: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, err: &ClmError) -> Self {
        self.ok = Some(false);
        self.error_code = Some(err.code().to_string());
        self.error_message = Some(err.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    File,
    Stderr,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Rotate once the file would grow past this many bytes.
    pub max_size_bytes: u64,
    /// Rotated generations kept (`activity.jsonl.1` .. `.N`).
    pub max_rotated_files: u32,
    pub fsync_interval: Duration,
}

/// Append-only JSONL writer with size rotation and stderr fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
    last_fsync: Instant,
}

impl JsonlWriter {
    /// Open the log file, degrading to stderr if that fails.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
            last_fsync: Instant::now(),
        };
        match open_append(&writer.config.path) {
            Ok((file, size)) => writer.attach(file, size),
            Err(err) => {
                let _ = writeln!(io::stderr(), "[CLM-JSONL] {err}; writing activity to stderr");
                writer.state = WriterState::Stderr;
            }
        }
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[CLM-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    /// Current degradation level: `file`, `stderr`, or `discard`.
    #[must_use]
    pub const fn state(&self) -> &'static str {
        match self.state {
            WriterState::File => "file",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn attach(&mut self, file: File, size: u64) {
        self.writer = Some(BufWriter::with_capacity(16 * 1024, file));
        self.state = WriterState::File;
        self.bytes_written = size;
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.state == WriterState::File
            && self.bytes_written > 0
            && self.bytes_written + len > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::File => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += len;
                    if self.last_fsync.elapsed() >= self.config.fsync_interval {
                        self.fsync();
                    }
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[CLM-JSONL] {line}").is_err() {
                    self.degrade();
                }
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::File => {
                let _ = writeln!(
                    io::stderr(),
                    "[CLM-JSONL] write to {} failed, using stderr",
                    self.config.path.display()
                );
                WriterState::Stderr
            }
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }

    fn rotate(&mut self) {
        self.flush();
        self.writer = None;
        let base = self.config.path.clone();

        // .N-1 -> .N, ..., .1 -> .2, current -> .1
        let keep = self.config.max_rotated_files;
        if keep > 0 {
            let _ = fs::remove_file(rotated_name(&base, keep));
            for i in (1..keep).rev() {
                let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
            }
            let _ = rename(&base, rotated_name(&base, 1));
        } else {
            let _ = fs::remove_file(&base);
        }

        match open_append(&base) {
            Ok((file, size)) => self.attach(file, size),
            Err(_) => self.degrade(),
        }
    }
}

/// Open or create `path` for appending; returns the file and its current size.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ClmError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ClmError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` -> `activity.jsonl.3`
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
