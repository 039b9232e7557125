//! Monitoring engine: one worker thread that loads the log once, then tails it
//! on a fixed interval.
//!
//! The worker owns the [`LogTailer`] and the [`LineClassifier`]; the shared
//! [`IngestionStore`] is the only state readers touch. Commands arrive on a
//! bounded crossbeam channel and are checked between load chunks, so a switch
//! or shutdown abandons an in-flight load without leaving a half-applied batch.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

use crate::core::config::Config;
use crate::core::errors::{ClmError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::parse::classifier::LineClassifier;
use crate::store::ingest::{IngestionStore, LoadState, PollStatus, StoreSnapshot};
use crate::store::ledger::IngestReport;
use crate::tail::tailer::{LogTailer, PollBatch, RotationPolicy};

const COMMAND_CHANNEL_CAP: usize = 16;

/// Control messages for the worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Poll immediately instead of waiting for the next tick.
    PollNow,
    /// Clear the store and re-read the current file from the start.
    Reload,
    /// Monitor a different file; implies a full load.
    SwitchLog(PathBuf),
    Shutdown,
}

/// Runtime knobs for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub log_file: PathBuf,
    pub poll_interval: Duration,
    pub load_chunk_lines: usize,
    pub rotation_policy: RotationPolicy,
    /// Recorded in the activity log so runs can be matched to their config.
    pub config_hash: String,
}

impl EngineOptions {
    #[must_use]
    pub fn from_config(config: &Config, log_file: PathBuf) -> Self {
        Self {
            log_file,
            poll_interval: config.poll_interval(),
            load_chunk_lines: config.monitor.load_chunk_lines,
            rotation_policy: config.monitor.rotation_policy,
            config_hash: config.stable_hash().unwrap_or_default(),
        }
    }
}

/// Owner of the worker thread. Dropping it stops and joins the worker.
pub struct EngineHandle {
    store: Arc<IngestionStore>,
    tx: Sender<EngineCommand>,
    join: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    /// Spawn the `clm-tailer` worker. The initial load starts immediately.
    pub fn spawn(
        options: EngineOptions,
        store: Arc<IngestionStore>,
        logger: ActivityLoggerHandle,
    ) -> Result<Self> {
        let classifier = LineClassifier::new()?;
        let (tx, rx) = bounded::<EngineCommand>(COMMAND_CHANNEL_CAP);

        let worker = Worker {
            tailer: LogTailer::new(options.log_file.clone()),
            options,
            classifier,
            store: Arc::clone(&store),
            logger,
            rx,
            missing_reported: false,
            started: Instant::now(),
        };

        let join = thread::Builder::new()
            .name("clm-tailer".to_string())
            .spawn(move || worker.run())
            .map_err(|source| ClmError::Runtime {
                details: format!("failed to spawn tailer thread: {source}"),
            })?;

        Ok(Self {
            store,
            tx,
            join: Some(join),
        })
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<IngestionStore> {
        &self.store
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn poll_now(&self) -> Result<()> {
        self.send(EngineCommand::PollNow)
    }

    pub fn reload(&self) -> Result<()> {
        self.send(EngineCommand::Reload)
    }

    pub fn switch_log(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.send(EngineCommand::SwitchLog(path.into()))
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| ClmError::ChannelClosed { component: "engine" })
    }

    fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.tx.send(EngineCommand::Shutdown);
            if join.join().is_err() {
                eprintln!("[CLM-ENGINE] tailer thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    options: EngineOptions,
    tailer: LogTailer,
    classifier: LineClassifier,
    store: Arc<IngestionStore>,
    logger: ActivityLoggerHandle,
    rx: Receiver<EngineCommand>,
    /// Suppresses repeated "file missing" activity events until the file returns.
    missing_reported: bool,
    started: Instant,
}

impl Worker {
    fn run(mut self) {
        self.logger.send(ActivityEvent::EngineStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            path: self.tailer.path().to_path_buf(),
            config_hash: self.options.config_hash.clone(),
        });

        let mut pending = self.load();
        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => match self.rx.recv_timeout(self.options.poll_interval) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => EngineCommand::PollNow,
                    Err(RecvTimeoutError::Disconnected) => EngineCommand::Shutdown,
                },
            };

            match command {
                EngineCommand::PollNow => self.poll_once(),
                EngineCommand::Reload => pending = self.load(),
                EngineCommand::SwitchLog(path) => {
                    self.logger.send(ActivityEvent::LogSwitched {
                        from: self.tailer.path().to_path_buf(),
                        to: path.clone(),
                    });
                    self.tailer = LogTailer::new(path);
                    self.missing_reported = false;
                    pending = self.load();
                }
                EngineCommand::Shutdown => break,
            }
        }

        self.logger.send(ActivityEvent::EngineStopped {
            reason: "shutdown requested".to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
        });
    }

    /// Full read of the current file in bounded chunks. Returns a command that
    /// interrupted the load, if any.
    fn load(&mut self) -> Option<EngineCommand> {
        let started = Instant::now();
        self.tailer.rewind();
        self.store.reset();

        let batch = match self.tailer.read_new_lines() {
            Ok(batch) => batch,
            Err(err) => {
                self.record_read_error(&err);
                self.store.set_load_state(LoadState::Complete { lines: 0 });
                return None;
            }
        };

        let path = self.tailer.path().to_path_buf();
        let total_lines = batch.lines.len() as u64;
        self.store.set_load_state(LoadState::Loading {
            lines_processed: 0,
            total_lines,
        });
        self.logger.send(ActivityEvent::LoadStarted {
            path: path.clone(),
            total_lines,
        });

        let mut processed = 0_u64;
        let mut report = IngestReport::default();
        for chunk in batch.lines.chunks(self.options.load_chunk_lines.max(1)) {
            if let Some(command) = self.interrupting_command() {
                self.store.set_load_state(LoadState::Cancelled {
                    lines_processed: processed,
                });
                self.logger.send(ActivityEvent::LoadCancelled {
                    path,
                    lines_processed: processed,
                });
                return Some(command);
            }

            let outcomes = chunk.iter().map(|line| self.classifier.classify(line));
            processed += chunk.len() as u64;
            let chunk_report = self.store.ingest_load_chunk(
                outcomes,
                LoadState::Loading {
                    lines_processed: processed,
                    total_lines,
                },
            );
            merge(&mut report, chunk_report);
        }

        self.store
            .set_load_state(LoadState::Complete { lines: processed });
        self.store.record_poll(PollStatus::Healthy {
            path: path.clone(),
            new_lines: processed,
            rotated: false,
        });
        self.missing_reported = false;
        self.report_rejected(&path, report.rejected_payloads);
        self.logger.send(ActivityEvent::LoadCompleted {
            path,
            lines: processed,
            events: report.proof_events,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
        None
    }

    /// Non-blocking check between load chunks. `PollNow` is meaningless while
    /// loading and is dropped.
    fn interrupting_command(&self) -> Option<EngineCommand> {
        loop {
            match self.rx.try_recv() {
                Ok(EngineCommand::PollNow) => {}
                Ok(command) => return Some(command),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(EngineCommand::Shutdown),
            }
        }
    }

    fn poll_once(&mut self) {
        match self.tailer.poll(&self.classifier) {
            Ok(batch) => self.apply_poll(batch),
            Err(err) => self.record_read_error(&err),
        }
    }

    fn apply_poll(&mut self, batch: PollBatch) {
        let path = self.tailer.path().to_path_buf();
        let new_lines = batch.outcomes.len() as u64;
        let rotated = batch.rotated;

        if rotated {
            self.logger.send(ActivityEvent::RotationDetected {
                path: path.clone(),
                policy: self.options.rotation_policy,
            });
        }

        let report = match (rotated, self.options.rotation_policy) {
            (true, RotationPolicy::Reset) => self.store.reset_and_ingest(batch.outcomes),
            _ if new_lines > 0 => self.store.ingest_batch(batch.outcomes),
            _ => IngestReport::default(),
        };
        self.report_rejected(&path, report.rejected_payloads);

        self.missing_reported = false;
        self.store.record_poll(PollStatus::Healthy {
            path,
            new_lines,
            rotated,
        });
    }

    fn record_read_error(&mut self, err: &ClmError) {
        let path = self.tailer.path().to_path_buf();
        if let ClmError::FileNotFound { .. } = err {
            if !self.missing_reported {
                self.logger
                    .send(ActivityEvent::FileMissing { path: path.clone() });
                self.missing_reported = true;
            }
            self.store.record_poll(PollStatus::FileNotFound { path });
        } else {
            self.logger.send(ActivityEvent::ReadFailed {
                path: path.clone(),
                code: err.code().to_string(),
                message: err.to_string(),
            });
            self.store.record_poll(PollStatus::ReadError {
                path,
                message: err.to_string(),
            });
        }
    }

    fn report_rejected(&self, path: &Path, count: u64) {
        if count > 0 {
            self.logger.send(ActivityEvent::PayloadsRejected {
                path: path.to_path_buf(),
                count,
            });
        }
    }
}

fn merge(total: &mut IngestReport, part: IngestReport) {
    total.proof_events += part.proof_events;
    total.side_channel += part.side_channel;
    total.unrecognized += part.unrecognized;
    total.rejected_payloads += part.rejected_payloads;
}

/// One-shot synchronous load of `path` into `store`, for non-live callers.
///
/// Unlike the engine, a missing or unreadable file is returned as an error.
pub fn ingest_file(
    path: &Path,
    store: &IngestionStore,
    chunk_lines: usize,
) -> Result<IngestReport> {
    let classifier = LineClassifier::new()?;
    let mut tailer = LogTailer::new(path);
    let batch = tailer.read_new_lines()?;

    let total_lines = batch.lines.len() as u64;
    let mut processed = 0_u64;
    let mut report = IngestReport::default();
    for chunk in batch.lines.chunks(chunk_lines.max(1)) {
        processed += chunk.len() as u64;
        let part = store.ingest_load_chunk(
            chunk.iter().map(|line| classifier.classify(line)),
            LoadState::Loading {
                lines_processed: processed,
                total_lines,
            },
        );
        merge(&mut report, part);
    }
    store.set_load_state(LoadState::Complete { lines: processed });
    store.record_poll(PollStatus::Healthy {
        path: path.to_path_buf(),
        new_lines: processed,
        rotated: false,
    });
    Ok(report)
}
