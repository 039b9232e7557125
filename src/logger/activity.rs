//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Everyone else sends
//! [`ActivityEvent`]s through a bounded crossbeam channel with `try_send`, so a
//! slow disk never stalls the tailer.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{ClmError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::tail::tailer::RotationPolicy;

const CHANNEL_CAPACITY: usize = 512;

/// Things worth recording about the engine's life.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    EngineStarted {
        version: String,
        path: PathBuf,
        config_hash: String,
    },
    EngineStopped {
        reason: String,
        uptime_secs: u64,
    },
    ConfigLoaded {
        source: String,
        config_hash: String,
    },
    LoadStarted {
        path: PathBuf,
        total_lines: u64,
    },
    LoadCompleted {
        path: PathBuf,
        lines: u64,
        events: u64,
        duration_ms: u64,
    },
    LoadCancelled {
        path: PathBuf,
        lines_processed: u64,
    },
    RotationDetected {
        path: PathBuf,
        policy: RotationPolicy,
    },
    LogSwitched {
        from: PathBuf,
        to: PathBuf,
    },
    FileMissing {
        path: PathBuf,
    },
    ReadFailed {
        path: PathBuf,
        code: String,
        message: String,
    },
    PayloadsRejected {
        path: PathBuf,
        count: u64,
    },
    /// Stop the logger thread after draining what was sent before it.
    Shutdown,
}

/// Cloneable sender side of the activity logger.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle whose events go nowhere; used when activity logging is off.
    #[must_use]
    pub fn disabled() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Non-blocking send. A full channel drops the event and bumps the counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Join its handle afterwards.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

pub struct ActivityLoggerConfig {
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl From<&LoggingConfig> for ActivityLoggerConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            jsonl: JsonlConfig {
                path: config.activity_log.clone(),
                max_size_bytes: config.max_size_bytes,
                max_rotated_files: config.max_rotated_files,
                fsync_interval: Duration::from_secs(config.fsync_interval_secs),
            },
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the `clm-logger` thread.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let jsonl = config.jsonl;
    let join = thread::Builder::new()
        .name("clm-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl, &dropped))
        .map_err(|e| ClmError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut writer = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            writer.write_entry(
                &LogEntry::new(EventType::DroppedEvents, Severity::Warning)
                    .with_details(format!("{lost} activity events dropped under back-pressure")),
            );
        }
        if event == ActivityEvent::Shutdown {
            break;
        }
        writer.write_entry(&to_log_entry(&event));
    }

    writer.flush();
    writer.fsync();
}

fn to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::EngineStarted {
            version,
            path,
            config_hash,
        } => LogEntry::new(EventType::EngineStart, Severity::Info)
            .with_path(path)
            .with_details(format!("version={version} config_hash={config_hash}")),
        ActivityEvent::EngineStopped {
            reason,
            uptime_secs,
        } => LogEntry::new(EventType::EngineStop, Severity::Info)
            .with_details(format!("reason={reason} uptime={uptime_secs}s")),
        ActivityEvent::ConfigLoaded {
            source,
            config_hash,
        } => LogEntry::new(EventType::ConfigLoaded, Severity::Info)
            .with_details(format!("source={source} config_hash={config_hash}")),
        ActivityEvent::LoadStarted { path, total_lines } => {
            let mut e = LogEntry::new(EventType::LoadStart, Severity::Info).with_path(path);
            e.lines = Some(*total_lines);
            e
        }
        ActivityEvent::LoadCompleted {
            path,
            lines,
            events,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::LoadComplete, Severity::Info).with_path(path);
            e.lines = Some(*lines);
            e.events = Some(*events);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::LoadCancelled {
            path,
            lines_processed,
        } => {
            let mut e = LogEntry::new(EventType::LoadCancel, Severity::Warning).with_path(path);
            e.lines = Some(*lines_processed);
            e.ok = Some(false);
            e
        }
        ActivityEvent::RotationDetected { path, policy } => {
            LogEntry::new(EventType::Rotation, Severity::Warning)
                .with_path(path)
                .with_details(format!("policy={policy:?}").to_lowercase())
        }
        ActivityEvent::LogSwitched { from, to } => LogEntry::new(EventType::LogSwitch, Severity::Info)
            .with_path(to)
            .with_details(format!("from={}", from.display())),
        ActivityEvent::FileMissing { path } => {
            LogEntry::new(EventType::FileMissing, Severity::Warning).with_path(path)
        }
        ActivityEvent::ReadFailed {
            path,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::ReadError, Severity::Error).with_path(path);
            e.ok = Some(false);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::PayloadsRejected { path, count } => {
            let mut e = LogEntry::new(EventType::PayloadRejected, Severity::Warning).with_path(path);
            e.lines = Some(*count);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::EngineStop, Severity::Info),
    }
}
