//! Persistent configuration records and filesystem layout
//!
//! Every manager owns an explicit configuration value that is loaded from a
//! [`ConfigStore`] at construction and written back only through its `save()`.

pub mod layout;
pub mod store;

pub use layout::CertDirLayout;
pub use store::{ConfigStore, FileStore, MemoryStore, load_record, save_record};

/// Store key for the CA bundle rotation record
pub const ROTATION_CONFIG_KEY: &str = "ssl_rotation_config";
/// Store key for the timeout and retry record
pub const TIMEOUT_CONFIG_KEY: &str = "ssl_timeout_config";
/// Store key for the unified TLS options record
pub const SSL_OPTIONS_KEY: &str = "ssl_config_options";
/// Store key for the per-host latency history
pub const LATENCY_HISTORY_KEY: &str = "ssl_latency_history";
