#![forbid(unsafe_code)]

//! Chia log monitor (clm): incremental ingestion of Chia harvester
//! `debug.log` files into a queryable statistics store.
//!
//! Pipeline:
//! 1. **Tailer** reads only the bytes appended since the last poll and
//!    detects truncation or replacement
//! 2. **Classifier** turns each line into exactly one typed outcome
//! 3. **Store** keeps the ordered proof events plus pool, farmer, fee and
//!    points side-channel state, with running aggregates
//!
//! The [`engine`] runs the tailer on a worker thread and publishes
//! snapshots; readers never block the writer for longer than one batch.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use chia_log_monitor::prelude::*;
//!
//! let store = IngestionStore::default();
//! ingest_file(std::path::Path::new("debug.log"), &store, 5000)?;
//! println!("{} lookups", store.count());
//! # Ok::<(), ClmError>(())
//! ```

pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod engine;
pub mod logger;
pub mod model;
pub mod parse;
pub mod store;
pub mod tail;
