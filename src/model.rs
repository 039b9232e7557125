//! Typed records produced by the line classifier and held by the ingestion store.

#![allow(missing_docs)]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Lookup time above which a farming cycle is considered slow.
///
/// Harvesters must answer a signage point within roughly this budget for a
/// proof to be accepted.
pub const DEFAULT_SLOW_THRESHOLD_SECS: f64 = 8.0;

/// One parsed farming-cycle line ("N plots were eligible for farming ...").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProofEvent {
    /// Local wall-clock time printed by the harvester (no zone information).
    pub timestamp: NaiveDateTime,
    pub eligible_plots: u64,
    pub proofs_found: u64,
    pub time_taken_secs: f64,
    pub total_plots: u64,
}

impl ProofEvent {
    /// Whether the lookup exceeded `threshold_secs`.
    #[must_use]
    pub fn is_slow(&self, threshold_secs: f64) -> bool {
        self.time_taken_secs > threshold_secs
    }

    #[must_use]
    pub const fn found_proof(&self) -> bool {
        self.proofs_found > 0
    }
}

/// Pool description from a `GET /pool_info` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub name: String,
    pub discord_handle: String,
    pub fee_percent: f64,
}

/// Farmer standing from a `GET /farmer` response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FarmerInfo {
    pub current_difficulty: f64,
    pub current_points: u64,
}

/// Fee annotation carried by "Found proof" lines of fee-charging harvesters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeInfo {
    /// `false` when the line carries no `used_gpu` annotation.
    pub gpu_used: bool,
    pub fee_rate_percent: f64,
}

/// Which `response:` marker a rejected payload belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    PoolInfo,
    Farmer,
}

impl PayloadKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PoolInfo => "pool_info",
            Self::Farmer => "farmer",
        }
    }
}

/// Why a line produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecognizedReason {
    /// No pattern matched.
    NoMatch,
    /// A response marker matched but its payload was unsafe, malformed, or
    /// missing required keys.
    MalformedPayload(PayloadKind),
}

/// Result of classifying one raw log line. Exactly one kind per line.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedOutcome {
    ProofEvent(ProofEvent),
    PoolInfoUpdate(PoolInfo),
    FarmerInfoUpdate(FarmerInfo),
    FeeCandidateLine(FeeInfo),
    PointsUpdate(u64),
    Unrecognized(UnrecognizedReason),
}

impl ClassifiedOutcome {
    #[must_use]
    pub const fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }

    /// Short label used in activity logs and debug output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProofEvent(_) => "proof_event",
            Self::PoolInfoUpdate(_) => "pool_info",
            Self::FarmerInfoUpdate(_) => "farmer_info",
            Self::FeeCandidateLine(_) => "fee",
            Self::PointsUpdate(_) => "points",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}
