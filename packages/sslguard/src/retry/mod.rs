//! Timeout resolution, error classification and retry orchestration
//!
//! [`SslTimeoutManager`] owns one [`TimeoutConfig`] and runs outbound calls
//! through [`SslTimeoutManager::execute_with_retry`]. [`RetryingFetcher`]
//! adapts any [`Fetch`](crate::transport::Fetch) so every fetch goes through
//! the same machinery.

pub mod classify;
pub mod executor;
pub mod fetcher;
pub mod manager;
pub mod policy;
pub mod timeouts;

pub use classify::{Outcome, determine_error_type, is_valid_result};
pub use executor::{RequestArgs, RetryState, Sleeper, ThreadSleeper};
pub use fetcher::RetryingFetcher;
pub use manager::{DEFAULT_LATENCY_PERSIST_RATIO, LatencyLevel, SslTimeoutManager};
pub use policy::{ErrorPolicy, ErrorType, backoff_base};
pub use timeouts::{HostOverride, ResolvedTimeouts, TimeoutConfig};
