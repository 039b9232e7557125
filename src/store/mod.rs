//! In-memory event store: ledger, concurrent wrapper, windowed views.

pub mod ingest;
pub mod ledger;
pub mod window;
