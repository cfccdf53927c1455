//! Outbound transport boundary
//!
//! The subsystem configures and wraps a transport but does not own socket I/O
//! semantics. [`Fetch`] is the capability every download goes through;
//! [`TransportHandle`] is the opaque configuration surface TLS options are
//! applied to. [`HttpsFetcher`] is a small blocking reference implementation
//! of both over rustls.

pub mod debug;
pub mod handle;
pub mod http_connect;
pub mod https;
pub mod response;
pub mod settings;

use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;

pub use debug::{DebugCapture, DebugSink};
pub use handle::{TlsVersion, TransportHandle};
pub use https::HttpsFetcher;
pub use settings::TransportSettings;

use crate::error::TransportError;

/// Per-call options for a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connection establishment timeout, defaults to `timeout`
    pub connect_timeout: Option<Duration>,
    /// Require peer verification regardless of the transport's configured default
    pub verify_peer: bool,
}

impl FetchOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            connect_timeout: None,
            verify_peer: true,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Status and body of a completed GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Outbound fetch capability: `fetch(url, options) -> {status, body} | error`
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError>;
}

impl<F: Fetch + ?Sized> Fetch for std::sync::Arc<F> {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        (**self).fetch(url, options)
    }
}

impl<F: Fetch + ?Sized> Fetch for Box<F> {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        (**self).fetch(url, options)
    }
}
