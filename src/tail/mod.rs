//! Incremental reading of the harvester log.

pub mod tailer;
