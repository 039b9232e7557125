//! Structured activity log: JSONL writer plus the logger thread that feeds it.

pub mod activity;
pub mod jsonl;
