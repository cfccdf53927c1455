//! Retry and latency telemetry
//!
//! Statistics here feed logging and status reporting only; nothing in the
//! retry path branches on them.

pub mod latency;
pub mod retry_stats;

pub use latency::{LATENCY_HISTORY_CAPACITY, LatencyHistory, LatencyRecord, LatencyStats};
pub use retry_stats::RetryStats;
