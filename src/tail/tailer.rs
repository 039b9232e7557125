//! Incremental log tailer: resumes from a byte offset, detects truncation and
//! rotation, and only ever consumes complete newline-terminated lines.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{ClmError, Result};
use crate::model::ClassifiedOutcome;
use crate::parse::classifier::LineClassifier;

/// What the store does with existing content when the tailer reports rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// Treat the rotated file as a new log: clear the store, ingest only new content.
    #[default]
    Reset,
    /// Keep prior events and append whatever is re-read from offset 0.
    Append,
}

/// Device and inode of the file last read (Unix only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    device: u64,
    inode: u64,
}

fn file_identity(meta: &fs::Metadata) -> Option<FileIdentity> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(FileIdentity {
            device: meta.dev(),
            inode: meta.ino(),
        })
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}

/// Raw lines read by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBatch {
    pub lines: Vec<String>,
    /// The file was truncated or replaced since the previous read.
    pub rotated: bool,
    pub bytes_consumed: u64,
}

/// Classified outcomes of one poll, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    pub outcomes: Vec<ClassifiedOutcome>,
    pub rotated: bool,
    pub bytes_consumed: u64,
}

impl PollBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty() && !self.rotated
    }
}

/// Offset-tracking reader for one log file.
#[derive(Debug, Clone)]
pub struct LogTailer {
    path: PathBuf,
    known_offset: u64,
    known_size: u64,
    identity: Option<FileIdentity>,
}

impl LogTailer {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            known_offset: 0,
            known_size: 0,
            identity: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last consumed newline.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.known_offset
    }

    /// File size observed at the last successful read.
    #[must_use]
    pub const fn known_size(&self) -> u64 {
        self.known_size
    }

    /// Forget all progress; the next read starts at offset 0.
    pub fn rewind(&mut self) {
        self.known_offset = 0;
        self.known_size = 0;
        self.identity = None;
    }

    /// Read every complete line appended since the previous call.
    ///
    /// A missing file yields [`ClmError::FileNotFound`] and leaves the offset
    /// untouched. A trailing line without `\n` stays unconsumed.
    pub fn read_new_lines(&mut self) -> Result<LineBatch> {
        let mut file = File::open(&self.path).map_err(|err| ClmError::read(&self.path, err))?;
        let meta = file
            .metadata()
            .map_err(|err| ClmError::read(&self.path, err))?;
        let size = meta.len();
        let identity = file_identity(&meta);

        let replaced = matches!((self.identity, identity), (Some(old), Some(new)) if old != new);
        let rotated = replaced || size < self.known_offset;
        let start = if rotated { 0 } else { self.known_offset };

        if size == start {
            self.commit(start, size, identity);
            return Ok(LineBatch {
                lines: Vec::new(),
                rotated,
                bytes_consumed: 0,
            });
        }

        file.seek(SeekFrom::Start(start))
            .map_err(|err| ClmError::read(&self.path, err))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|err| ClmError::read(&self.path, err))?;

        let Some(last_newline) = memchr::memrchr(b'\n', &buf) else {
            self.commit(start, size, identity);
            return Ok(LineBatch {
                lines: Vec::new(),
                rotated,
                bytes_consumed: 0,
            });
        };

        let complete = &buf[..last_newline];
        let mut lines = Vec::new();
        let mut line_start = 0;
        for pos in memchr::memchr_iter(b'\n', complete).chain(std::iter::once(complete.len())) {
            lines.push(decode_line(&complete[line_start..pos]));
            line_start = pos + 1;
        }

        let consumed = (last_newline + 1) as u64;
        self.commit(start + consumed, size, identity);
        Ok(LineBatch {
            lines,
            rotated,
            bytes_consumed: consumed,
        })
    }

    /// Read new lines and classify each one in order.
    pub fn poll(&mut self, classifier: &LineClassifier) -> Result<PollBatch> {
        let batch = self.read_new_lines()?;
        Ok(PollBatch {
            outcomes: batch
                .lines
                .iter()
                .map(|line| classifier.classify(line))
                .collect(),
            rotated: batch.rotated,
            bytes_consumed: batch.bytes_consumed,
        })
    }

    fn commit(&mut self, offset: u64, size: u64, identity: Option<FileIdentity>) {
        self.known_offset = offset;
        self.known_size = size;
        self.identity = identity;
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PROOF_LINE: &str = "2024-05-01T12:00:00.250 harvester chia.harvester.harvester: INFO     3 plots were eligible for farming abc123... Found 0 proofs. Time: 0.51 s. Total 120 plots";

    fn append(path: &Path, text: &str) {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn append_resume_reads_only_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        append(&path, "a\nb\n");
        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.read_new_lines().unwrap().lines, vec!["a", "b"]);

        append(&path, "c\n");
        let batch = tailer.read_new_lines().unwrap();
        assert_eq!(batch.lines, vec!["c"]);
        assert!(!batch.rotated);
        assert_eq!(tailer.offset(), 6);
    }

    #[test]
    fn polling_unchanged_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        append(&path, "one\ntwo\n");
        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.read_new_lines().unwrap().lines.len(), 2);
        for _ in 0..3 {
            let batch = tailer.read_new_lines().unwrap();
            assert!(batch.lines.is_empty());
            assert_eq!(batch.bytes_consumed, 0);
            assert!(!batch.rotated);
        }
    }

    #[test]
    fn partial_line_is_deferred_until_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        append(&path, "done\nhalf");
        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.read_new_lines().unwrap().lines, vec!["done"]);
        assert_eq!(tailer.offset(), 5);

        assert!(tailer.read_new_lines().unwrap().lines.is_empty());

        append(&path, " way\n");
        assert_eq!(tailer.read_new_lines().unwrap().lines, vec!["half way"]);
    }

    #[test]
    fn truncation_rereads_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        append(&path, "first line\nsecond line\n");
        let mut tailer = LogTailer::new(&path);
        tailer.read_new_lines().unwrap();

        fs::write(&path, "new\n").unwrap();
        let batch = tailer.read_new_lines().unwrap();
        assert!(batch.rotated);
        assert_eq!(batch.lines, vec!["new"]);
        assert_eq!(tailer.offset(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn replaced_file_is_treated_as_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        append(&path, "old\n");
        let mut tailer = LogTailer::new(&path);
        tailer.read_new_lines().unwrap();

        let staged = dir.path().join("debug.log.new");
        fs::write(&staged, "old\nfresh\n").unwrap();
        fs::rename(&staged, &path).unwrap();

        let batch = tailer.read_new_lines().unwrap();
        assert!(batch.rotated);
        assert_eq!(batch.lines, vec!["old", "fresh"]);
    }

    #[test]
    fn missing_file_is_recoverable_and_keeps_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let mut tailer = LogTailer::new(&path);
        let err = tailer.read_new_lines().unwrap_err();
        assert_eq!(err.code(), "CLM-2001");
        assert!(err.is_retryable());
        assert_eq!(tailer.offset(), 0);

        append(&path, "late\n");
        assert_eq!(tailer.read_new_lines().unwrap().lines, vec!["late"]);
    }

    #[test]
    fn crlf_and_invalid_utf8_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        fs::write(&path, b"dos line\r\nbad \xff byte\n\n").unwrap();
        let mut tailer = LogTailer::new(&path);
        let lines = tailer.read_new_lines().unwrap().lines;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "dos line");
        assert_eq!(lines[1], "bad \u{fffd} byte");
        assert_eq!(lines[2], "");
    }

    #[test]
    fn rewind_rereads_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        append(&path, "x\ny\n");
        let mut tailer = LogTailer::new(&path);
        tailer.read_new_lines().unwrap();
        tailer.rewind();
        let batch = tailer.read_new_lines().unwrap();
        assert_eq!(batch.lines.len(), 2);
        assert!(!batch.rotated);
    }

    #[test]
    fn poll_classifies_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        append(&path, &format!("{PROOF_LINE}\nnoise\n"));
        let classifier = LineClassifier::new().unwrap();
        let mut tailer = LogTailer::new(&path);
        let batch = tailer.poll(&classifier).unwrap();
        assert_eq!(batch.outcomes.len(), 2);
        assert_eq!(batch.outcomes[0].kind(), "proof_event");
        assert!(batch.outcomes[1].is_unrecognized());
        assert!(!batch.is_empty());
        assert!(tailer.poll(&classifier).unwrap().is_empty());
    }

    #[test]
    fn rotation_policy_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: RotationPolicy,
        }
        let parsed: Wrapper = toml::from_str("policy = \"append\"").unwrap();
        assert_eq!(parsed.policy, RotationPolicy::Append);
        assert_eq!(RotationPolicy::default(), RotationPolicy::Reset);
    }
}
