//! Event ledger: the append-only event sequence, side-channel singletons, and
//! running aggregates. Pure data structure; locking lives in [`super::ingest`].

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::model::{
    ClassifiedOutcome, DEFAULT_SLOW_THRESHOLD_SECS, FarmerInfo, FeeInfo, PoolInfo, ProofEvent,
    UnrecognizedReason,
};
use crate::store::window::WindowedView;

/// Which fee observation [`EventLedger::fee_info`] reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeInfoPolicy {
    /// The most recent "Found proof" fee annotation.
    #[default]
    Latest,
    /// The first fee annotation seen since the last reset.
    First,
}

/// Knobs fixed for the lifetime of a ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSettings {
    pub slow_threshold_secs: f64,
    pub fee_info_policy: FeeInfoPolicy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            slow_threshold_secs: DEFAULT_SLOW_THRESHOLD_SECS,
            fee_info_policy: FeeInfoPolicy::default(),
        }
    }
}

/// Min/max/average of `time_taken_secs` over all recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeAggregate {
    pub count: usize,
    pub min_secs: f64,
    pub max_secs: f64,
    pub average_secs: f64,
}

/// Fast/slow split of all recorded lookups around a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketCounts {
    pub threshold_secs: f64,
    pub count_le: usize,
    pub count_gt: usize,
    pub percent_le: f64,
    pub percent_gt: f64,
}

impl BucketCounts {
    fn from_counts(threshold_secs: f64, count_le: usize, count_gt: usize) -> Self {
        let total = count_le + count_gt;
        let (percent_le, percent_gt) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                count_le as f64 / total as f64 * 100.0,
                count_gt as f64 / total as f64 * 100.0,
            )
        };
        Self {
            threshold_secs,
            count_le,
            count_gt,
            percent_le,
            percent_gt,
        }
    }
}

/// Counters for what a batch of outcomes did to the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub proof_events: u64,
    pub side_channel: u64,
    pub unrecognized: u64,
    pub rejected_payloads: u64,
}

impl IngestReport {
    pub fn record(&mut self, outcome: &ClassifiedOutcome) {
        match outcome {
            ClassifiedOutcome::ProofEvent(_) => self.proof_events += 1,
            ClassifiedOutcome::Unrecognized(UnrecognizedReason::NoMatch) => {
                self.unrecognized += 1;
            }
            ClassifiedOutcome::Unrecognized(UnrecognizedReason::MalformedPayload(_)) => {
                self.unrecognized += 1;
                self.rejected_payloads += 1;
            }
            _ => self.side_channel += 1,
        }
    }

    #[must_use]
    pub const fn lines(&self) -> u64 {
        self.proof_events + self.side_channel + self.unrecognized
    }
}

/// Incrementally maintained aggregates; updated on every append.
#[derive(Debug, Clone, Copy, Default)]
struct RunningTotals {
    min_secs: f64,
    max_secs: f64,
    sum_secs: f64,
    proofs_found: u64,
    count_le: usize,
    count_gt: usize,
}

/// Everything a status display needs, captured at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub event_count: usize,
    pub total_proofs_found: u64,
    pub time_taken: Option<TimeAggregate>,
    pub buckets: BucketCounts,
    pub last_fast_proof: Option<ProofEvent>,
    pub last_slow_proof: Option<ProofEvent>,
    pub first_event_at: Option<NaiveDateTime>,
    pub last_event_at: Option<NaiveDateTime>,
    pub elapsed_secs: Option<i64>,
    pub current_total_plots: Option<u64>,
    pub pool: Option<PoolInfo>,
    pub farmer: Option<FarmerInfo>,
    pub fee: Option<FeeInfo>,
    pub latest_points: Option<u64>,
    pub unrecognized_lines: u64,
    pub rejected_payloads: u64,
}

/// Append-only ledger of parsed log content.
#[derive(Debug, Clone)]
pub struct EventLedger {
    settings: LedgerSettings,
    events: Vec<ProofEvent>,
    totals: RunningTotals,
    pool: Option<PoolInfo>,
    farmer: Option<FarmerInfo>,
    first_fee: Option<FeeInfo>,
    latest_fee: Option<FeeInfo>,
    points: Vec<u64>,
    unrecognized_lines: u64,
    rejected_payloads: u64,
}

impl Default for EventLedger {
    fn default() -> Self {
        Self::new(LedgerSettings::default())
    }
}

impl EventLedger {
    #[must_use]
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            settings,
            events: Vec::new(),
            totals: RunningTotals::default(),
            pool: None,
            farmer: None,
            first_fee: None,
            latest_fee: None,
            points: Vec::new(),
            unrecognized_lines: 0,
            rejected_payloads: 0,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> LedgerSettings {
        self.settings
    }

    /// Drop all content, keeping settings.
    pub fn clear(&mut self) {
        *self = Self::new(self.settings);
    }

    /// Apply one classified line.
    pub fn apply(&mut self, outcome: ClassifiedOutcome) {
        match outcome {
            ClassifiedOutcome::ProofEvent(event) => self.push_event(event),
            ClassifiedOutcome::PoolInfoUpdate(info) => self.pool = Some(info),
            ClassifiedOutcome::FarmerInfoUpdate(info) => self.farmer = Some(info),
            ClassifiedOutcome::FeeCandidateLine(fee) => {
                self.first_fee.get_or_insert(fee);
                self.latest_fee = Some(fee);
            }
            ClassifiedOutcome::PointsUpdate(points) => self.points.push(points),
            ClassifiedOutcome::Unrecognized(reason) => {
                self.unrecognized_lines += 1;
                if matches!(reason, UnrecognizedReason::MalformedPayload(_)) {
                    self.rejected_payloads += 1;
                }
            }
        }
    }

    fn push_event(&mut self, event: ProofEvent) {
        let secs = event.time_taken_secs;
        let totals = &mut self.totals;
        if self.events.is_empty() {
            totals.min_secs = secs;
            totals.max_secs = secs;
        } else {
            totals.min_secs = totals.min_secs.min(secs);
            totals.max_secs = totals.max_secs.max(secs);
        }
        totals.sum_secs += secs;
        totals.proofs_found = totals.proofs_found.saturating_add(event.proofs_found);
        if event.is_slow(self.settings.slow_threshold_secs) {
            totals.count_gt += 1;
        } else {
            totals.count_le += 1;
        }
        self.events.push(event);
    }

    // ──────────────────── queries ────────────────────

    #[must_use]
    pub fn count(&self) -> usize {
        self.events.len()
    }

    /// All events in insertion order. Index `i` is a stable handle.
    #[must_use]
    pub fn events(&self) -> &[ProofEvent] {
        &self.events
    }

    #[must_use]
    pub fn aggregate_time_taken(&self) -> Option<TimeAggregate> {
        let count = self.events.len();
        if count == 0 {
            return None;
        }
        Some(TimeAggregate {
            count,
            min_secs: self.totals.min_secs,
            max_secs: self.totals.max_secs,
            average_secs: self.totals.sum_secs / count as f64,
        })
    }

    /// Bucket counts at the ledger's configured threshold (running totals).
    #[must_use]
    pub fn buckets(&self) -> BucketCounts {
        BucketCounts::from_counts(
            self.settings.slow_threshold_secs,
            self.totals.count_le,
            self.totals.count_gt,
        )
    }

    /// Bucket counts at an arbitrary threshold. Uses the running totals when
    /// `threshold_secs` is the configured one, otherwise scans.
    #[must_use]
    pub fn bucket_counts(&self, threshold_secs: f64) -> BucketCounts {
        if threshold_secs.to_bits() == self.settings.slow_threshold_secs.to_bits() {
            return self.buckets();
        }
        let count_gt = self
            .events
            .iter()
            .filter(|event| event.is_slow(threshold_secs))
            .count();
        BucketCounts::from_counts(threshold_secs, self.events.len() - count_gt, count_gt)
    }

    /// Latest-index event satisfying `predicate`.
    pub fn last_event_where<P>(&self, predicate: P) -> Option<ProofEvent>
    where
        P: FnMut(&&ProofEvent) -> bool,
    {
        self.events.iter().rev().find(predicate).copied()
    }

    /// Most recent cycle that found a proof within the threshold.
    #[must_use]
    pub fn last_fast_proof(&self) -> Option<ProofEvent> {
        let threshold = self.settings.slow_threshold_secs;
        self.last_event_where(|event| event.found_proof() && !event.is_slow(threshold))
    }

    /// Most recent cycle that found a proof but exceeded the threshold.
    #[must_use]
    pub fn last_slow_proof(&self) -> Option<ProofEvent> {
        let threshold = self.settings.slow_threshold_secs;
        self.last_event_where(|event| event.found_proof() && event.is_slow(threshold))
    }

    /// Last-inserted timestamp minus first-inserted timestamp.
    #[must_use]
    pub fn elapsed_since_first(&self) -> Option<TimeDelta> {
        let first = self.events.first()?;
        let last = self.events.last()?;
        Some(last.timestamp.signed_duration_since(first.timestamp))
    }

    /// `total_plots` of the most recently appended event.
    #[must_use]
    pub fn current_total_plots(&self) -> Option<u64> {
        self.events.last().map(|event| event.total_plots)
    }

    #[must_use]
    pub const fn total_proofs_found(&self) -> u64 {
        self.totals.proofs_found
    }

    #[must_use]
    pub const fn pool_info(&self) -> Option<&PoolInfo> {
        self.pool.as_ref()
    }

    #[must_use]
    pub const fn farmer_info(&self) -> Option<&FarmerInfo> {
        self.farmer.as_ref()
    }

    /// Fee observation selected by the configured [`FeeInfoPolicy`].
    #[must_use]
    pub const fn fee_info(&self) -> Option<&FeeInfo> {
        match self.settings.fee_info_policy {
            FeeInfoPolicy::Latest => self.latest_fee.as_ref(),
            FeeInfoPolicy::First => self.first_fee.as_ref(),
        }
    }

    #[must_use]
    pub fn latest_points(&self) -> Option<u64> {
        self.points.last().copied()
    }

    #[must_use]
    pub fn points_history(&self) -> &[u64] {
        &self.points
    }

    #[must_use]
    pub const fn unrecognized_lines(&self) -> u64 {
        self.unrecognized_lines
    }

    /// Events with `timestamp >= now - window`, in insertion order.
    pub fn events_since(
        &self,
        now: NaiveDateTime,
        window: TimeDelta,
    ) -> impl Iterator<Item = &ProofEvent> + '_ {
        let start = window_start(now, window);
        self.events
            .iter()
            .filter(move |event| event.timestamp >= start)
    }

    /// Owned windowed projection for the presentation layer.
    #[must_use]
    pub fn window(&self, now: NaiveDateTime, window: TimeDelta) -> WindowedView {
        WindowedView::new(
            self.events_since(now, window).copied().collect(),
            window_start(now, window),
            now,
            self.settings.slow_threshold_secs,
        )
    }

    #[must_use]
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            event_count: self.count(),
            total_proofs_found: self.total_proofs_found(),
            time_taken: self.aggregate_time_taken(),
            buckets: self.buckets(),
            last_fast_proof: self.last_fast_proof(),
            last_slow_proof: self.last_slow_proof(),
            first_event_at: self.events.first().map(|event| event.timestamp),
            last_event_at: self.events.last().map(|event| event.timestamp),
            elapsed_secs: self.elapsed_since_first().map(|delta| delta.num_seconds()),
            current_total_plots: self.current_total_plots(),
            pool: self.pool.clone(),
            farmer: self.farmer,
            fee: self.fee_info().copied(),
            latest_points: self.latest_points(),
            unrecognized_lines: self.unrecognized_lines,
            rejected_payloads: self.rejected_payloads,
        }
    }
}

/// `now - window`, saturating at the earliest representable instant so an
/// oversized window covers every event.
fn window_start(now: NaiveDateTime, window: TimeDelta) -> NaiveDateTime {
    now.checked_sub_signed(window).unwrap_or(NaiveDateTime::MIN)
}
