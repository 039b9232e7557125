//! Line parsing: ordered pattern classification and the safe payload literal parser.

pub mod classifier;
pub mod literal;
