//! Error types shared across the trust and transport subsystem
//!
//! Setup and argument validation return these as `Err`. Network and file
//! outcomes inside rotation, caching and retry are folded into soft results
//! (`bool` / `Option`) and only surface here for logging.

pub mod types;

pub use types::{RotationError, SetupError, StoreError, TransportError, TransportErrorKind};

/// Result alias for constructor and argument validation
pub type Result<T> = std::result::Result<T, SetupError>;
