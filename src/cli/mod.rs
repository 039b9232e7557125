//! Terminal presentation for the `clm` binary.

pub mod render;
#[cfg(feature = "signals")]
pub mod watch;
