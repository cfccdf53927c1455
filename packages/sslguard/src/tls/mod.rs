//! Unified outbound TLS configuration
//!
//! [`SslConfigManager`] is the single source of truth for connection options
//! and applies them uniformly to any [`TransportHandle`](crate::transport::TransportHandle).

pub mod bundle_paths;
pub mod manager;
pub mod options;

pub use bundle_paths::{PLUGIN_BUNDLE_CANDIDATES, SYSTEM_BUNDLE_CANDIDATES, first_readable};
pub use manager::SslConfigManager;
pub use options::{SslOptions, map_ssl_version};
