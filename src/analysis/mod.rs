//! Analysis module - baseline statistics for normal operation

mod baseline;
mod statistics;

pub use baseline::*;
pub use statistics::*;
