//! Background tailing engine and signal handling.

pub mod monitor;
#[cfg(feature = "signals")]
pub mod signals;
