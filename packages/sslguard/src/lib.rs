//! # sslguard
//!
//! Trust-material and resilient-transport subsystem for outbound HTTPS.
//!
//! ## Components
//!
//! - **[`CertificateRotation`]** keeps `<cert-dir>/ca-bundle.pem` fresh from
//!   prioritized remote sources, with timestamped backups and retention
//! - **[`SslConfigManager`]** owns the unified TLS options and applies them to
//!   any [`TransportHandle`]
//! - **[`CertificateCache`]** is a memory + disk cache of certificate material
//!   keyed by locator
//! - **[`SslTimeoutManager`]** resolves per-host and per-method timeouts,
//!   classifies failures and drives retries with exponential backoff
//!
//! [`SslGuard`] wires all four from one certificate directory:
//!
//! ```no_run
//! use sslguard::SslGuard;
//!
//! # fn main() -> sslguard::error::Result<()> {
//! let guard = SslGuard::builder("/var/lib/myapp/certs")
//!     .ssl_option("verify_depth", 4)
//!     .build()?;
//!
//! if !guard.rotation().rotate_certificates(false) {
//!     eprintln!("CA bundle rotation failed, keeping the current bundle");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! All operations are synchronous. Logging goes through `tracing`; the
//! library never installs a subscriber.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod retry;
pub mod rotation;
pub mod telemetry;
pub mod tls;
pub mod transport;

pub use cache::{CacheStats, CertificateCache, MemoryTier, SkipMapTier};
pub use config::{CertDirLayout, ConfigStore, FileStore, MemoryStore};
pub use error::{RotationError, SetupError, StoreError, TransportError, TransportErrorKind};
pub use guard::{SslGuard, SslGuardBuilder};
pub use retry::{
    ErrorPolicy, ErrorType, Outcome, RequestArgs, RetryingFetcher, Sleeper, SslTimeoutManager,
    ThreadSleeper, TimeoutConfig,
};
pub use rotation::{CertificateRotation, CertificateSource, RotationConfig, RotationStatus};
pub use telemetry::{LatencyStats, RetryStats};
pub use tls::{SslConfigManager, SslOptions};
pub use transport::{
    DebugCapture, Fetch, FetchOptions, FetchResponse, HttpsFetcher, TlsVersion, TransportHandle,
    TransportSettings,
};
