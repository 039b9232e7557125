//! Time-windowed projection over the event ledger, used by the live chart.

#![allow(missing_docs)]

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::model::ProofEvent;

/// Minimum y-axis ceiling for the lookup-time chart.
pub const MIN_Y_LIMIT_SECS: f64 = 10.0;

/// Headroom added above the slowest lookup when it exceeds [`MIN_Y_LIMIT_SECS`].
const Y_LIMIT_HEADROOM_SECS: f64 = 2.0;

/// Events inside `[start, end]` plus the threshold used to split them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowedView {
    start: NaiveDateTime,
    end: NaiveDateTime,
    threshold_secs: f64,
    events: Vec<ProofEvent>,
}

impl WindowedView {
    #[must_use]
    pub const fn new(
        events: Vec<ProofEvent>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        threshold_secs: f64,
    ) -> Self {
        Self {
            start,
            end,
            threshold_secs,
            events,
        }
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDateTime {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDateTime {
        self.end
    }

    #[must_use]
    pub const fn threshold_secs(&self) -> f64 {
        self.threshold_secs
    }

    #[must_use]
    pub fn events(&self) -> &[ProofEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events at or under the threshold.
    pub fn fast(&self) -> impl Iterator<Item = &ProofEvent> + '_ {
        self.events
            .iter()
            .filter(|event| !event.is_slow(self.threshold_secs))
    }

    /// Events over the threshold.
    pub fn slow(&self) -> impl Iterator<Item = &ProofEvent> + '_ {
        self.events
            .iter()
            .filter(|event| event.is_slow(self.threshold_secs))
    }

    /// Events that found at least one proof.
    pub fn with_proofs(&self) -> impl Iterator<Item = &ProofEvent> + '_ {
        self.events.iter().filter(|event| event.found_proof())
    }

    /// Restrict this view to events that found at least one proof.
    #[must_use]
    pub fn proofs_only(self) -> Self {
        Self {
            events: self
                .events
                .into_iter()
                .filter(ProofEvent::found_proof)
                .collect(),
            ..self
        }
    }

    #[must_use]
    pub fn max_time_taken(&self) -> Option<f64> {
        self.events
            .iter()
            .map(|event| event.time_taken_secs)
            .reduce(f64::max)
    }

    /// Chart ceiling: slowest lookup plus headroom, never below 10 s.
    #[must_use]
    pub fn suggested_y_limit(&self) -> f64 {
        match self.max_time_taken() {
            Some(max) if max > MIN_Y_LIMIT_SECS => max + Y_LIMIT_HEADROOM_SECS,
            _ => MIN_Y_LIMIT_SECS,
        }
    }
}
