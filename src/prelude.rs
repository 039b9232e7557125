//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use chia_log_monitor::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{ClmError, Result};

// Records
pub use crate::model::{
    ClassifiedOutcome, FarmerInfo, FeeInfo, PoolInfo, ProofEvent, UnrecognizedReason,
};
pub use crate::parse::classifier::LineClassifier;

// Store
pub use crate::store::ingest::{IngestionStore, LoadState, PollStatus, StoreSnapshot};
pub use crate::store::ledger::{
    BucketCounts, EventLedger, FeeInfoPolicy, IngestReport, LedgerSettings, StatsSummary,
    TimeAggregate,
};
pub use crate::store::window::WindowedView;

// Tailing
pub use crate::tail::tailer::{LogTailer, RotationPolicy};

// Engine
pub use crate::engine::monitor::{EngineCommand, EngineHandle, EngineOptions, ingest_file};
#[cfg(feature = "signals")]
pub use crate::engine::signals::SignalHandler;

// Activity log
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
