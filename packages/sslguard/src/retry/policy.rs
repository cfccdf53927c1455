//! Error classes and per-class retry policies

use std::time::Duration;

use fastrand::Rng;
use serde::{Deserialize, Serialize};

/// Classification of a failed outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ConnectionTimeout,
    SslError,
    ServerError,
    ClientError,
    ConnectionError,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "connection_timeout",
            Self::SslError => "ssl_error",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::ConnectionError => "connection_error",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry budget and backoff base for one error class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
}

/// Exponential backoff before jitter: `factor^retry`, zero for the first attempt
#[inline]
#[must_use]
pub fn backoff_base(retry: u32, backoff_factor: f64) -> f64 {
    if retry == 0 {
        return 0.0;
    }
    backoff_factor.powi(i32::try_from(retry).unwrap_or(i32::MAX))
}

/// Backoff with up to `jitter * base` of random extra delay
#[allow(clippy::cast_precision_loss)]
pub(crate) fn backoff_with_jitter(retry: u32, backoff_factor: f64, jitter: f64) -> Duration {
    let base = backoff_base(retry, backoff_factor);
    if base <= 0.0 {
        return Duration::ZERO;
    }
    let mut rng = Rng::new();
    let delay = base + jitter * base * rng.f64();
    Duration::try_from_secs_f64(delay).unwrap_or(Duration::MAX)
}
