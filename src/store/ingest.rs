//! Thread-safe ingestion store shared by the tailer worker and readers.
//!
//! One writer (the tailer) and any number of readers. Every mutation takes the
//! write lock for the whole batch, so readers never see a half-applied batch.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::path::PathBuf;

use chrono::{NaiveDateTime, TimeDelta};
use parking_lot::RwLock;
use serde::Serialize;

use crate::model::{ClassifiedOutcome, FarmerInfo, FeeInfo, PoolInfo, ProofEvent};
use crate::store::ledger::{
    BucketCounts, EventLedger, IngestReport, LedgerSettings, StatsSummary, TimeAggregate,
};
use crate::store::window::WindowedView;

/// Progress of the initial full-file load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        lines_processed: u64,
        total_lines: u64,
    },
    Complete {
        lines: u64,
    },
    Cancelled {
        lines_processed: u64,
    },
}

impl LoadState {
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Cancelled { .. })
    }

    /// Fraction in `[0, 1]` while loading; `None` otherwise.
    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        match *self {
            Self::Loading {
                lines_processed,
                total_lines,
            } => {
                if total_lines == 0 {
                    Some(1.0)
                } else {
                    Some((lines_processed as f64 / total_lines as f64).min(1.0))
                }
            }
            _ => None,
        }
    }
}

/// Outcome of the most recent incremental poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollStatus {
    #[default]
    Pending,
    Healthy {
        path: PathBuf,
        new_lines: u64,
        rotated: bool,
    },
    FileNotFound {
        path: PathBuf,
    },
    ReadError {
        path: PathBuf,
        message: String,
    },
}

impl PollStatus {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Consistent copy of everything a reader might render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub load: LoadState,
    pub last_poll: PollStatus,
    #[serde(flatten)]
    pub stats: StatsSummary,
}

#[derive(Debug)]
struct StoreState {
    ledger: EventLedger,
    load: LoadState,
    last_poll: PollStatus,
}

/// Ledger behind a reader-writer lock, plus load and poll status.
#[derive(Debug)]
pub struct IngestionStore {
    state: RwLock<StoreState>,
}

impl Default for IngestionStore {
    fn default() -> Self {
        Self::new(LedgerSettings::default())
    }
}

impl IngestionStore {
    #[must_use]
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            state: RwLock::new(StoreState {
                ledger: EventLedger::new(settings),
                load: LoadState::Idle,
                last_poll: PollStatus::Pending,
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> LedgerSettings {
        self.state.read().ledger.settings()
    }

    // ──────────────────── mutation ────────────────────

    pub fn ingest(&self, outcome: ClassifiedOutcome) {
        self.state.write().ledger.apply(outcome);
    }

    /// Apply a batch atomically with respect to readers.
    pub fn ingest_batch<I>(&self, outcomes: I) -> IngestReport
    where
        I: IntoIterator<Item = ClassifiedOutcome>,
    {
        let mut state = self.state.write();
        apply_all(&mut state.ledger, outcomes)
    }

    /// Drop every event, singleton, and counter. Settings are kept.
    pub fn reset(&self) {
        self.state.write().ledger.clear();
    }

    /// Clear and re-ingest under one write lock; readers see either the old
    /// state or the fully re-ingested one.
    pub fn reset_and_ingest<I>(&self, outcomes: I) -> IngestReport
    where
        I: IntoIterator<Item = ClassifiedOutcome>,
    {
        let mut state = self.state.write();
        state.ledger.clear();
        apply_all(&mut state.ledger, outcomes)
    }

    /// Apply a load chunk and publish progress in the same critical section.
    pub fn ingest_load_chunk<I>(&self, outcomes: I, progress: LoadState) -> IngestReport
    where
        I: IntoIterator<Item = ClassifiedOutcome>,
    {
        let mut state = self.state.write();
        let report = apply_all(&mut state.ledger, outcomes);
        state.load = progress;
        report
    }

    pub fn set_load_state(&self, load: LoadState) {
        self.state.write().load = load;
    }

    pub fn record_poll(&self, status: PollStatus) {
        self.state.write().last_poll = status;
    }

    // ──────────────────── queries ────────────────────

    /// Run `f` against the ledger under the read lock.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&EventLedger) -> R) -> R {
        f(&self.state.read().ledger)
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.state.read().load
    }

    #[must_use]
    pub fn last_poll(&self) -> PollStatus {
        self.state.read().last_poll.clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.state.read().ledger.count()
    }

    #[must_use]
    pub fn aggregate_time_taken(&self) -> Option<TimeAggregate> {
        self.state.read().ledger.aggregate_time_taken()
    }

    #[must_use]
    pub fn bucket_counts(&self, threshold_secs: f64) -> BucketCounts {
        self.state.read().ledger.bucket_counts(threshold_secs)
    }

    pub fn last_event_where<P>(&self, predicate: P) -> Option<ProofEvent>
    where
        P: FnMut(&&ProofEvent) -> bool,
    {
        self.state.read().ledger.last_event_where(predicate)
    }

    #[must_use]
    pub fn elapsed_since_first(&self) -> Option<TimeDelta> {
        self.state.read().ledger.elapsed_since_first()
    }

    #[must_use]
    pub fn current_total_plots(&self) -> Option<u64> {
        self.state.read().ledger.current_total_plots()
    }

    #[must_use]
    pub fn pool_info(&self) -> Option<PoolInfo> {
        self.state.read().ledger.pool_info().cloned()
    }

    #[must_use]
    pub fn farmer_info(&self) -> Option<FarmerInfo> {
        self.state.read().ledger.farmer_info().copied()
    }

    #[must_use]
    pub fn fee_info(&self) -> Option<FeeInfo> {
        self.state.read().ledger.fee_info().copied()
    }

    #[must_use]
    pub fn latest_points(&self) -> Option<u64> {
        self.state.read().ledger.latest_points()
    }

    #[must_use]
    pub fn window(&self, now: NaiveDateTime, window: TimeDelta) -> WindowedView {
        self.state.read().ledger.window(now, window)
    }

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        StoreSnapshot {
            load: state.load,
            last_poll: state.last_poll.clone(),
            stats: state.ledger.summary(),
        }
    }
}

fn apply_all<I>(ledger: &mut EventLedger, outcomes: I) -> IngestReport
where
    I: IntoIterator<Item = ClassifiedOutcome>,
{
    let mut report = IngestReport::default();
    for outcome in outcomes {
        report.record(&outcome);
        ledger.apply(outcome);
    }
    report
}
