//! # EBC Profiler
//!
//! Encode/decode statistics for the EBC codec.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod stats;

pub use stats::{CodecStats, CodecStatsSnapshot, FamilyCount, ProfilerConfig};
