use std::fmt;
use std::path::PathBuf;

/// Errors raised synchronously while constructing or configuring a component
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value configuration store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to serialize record '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to deserialize record '{key}': {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Store IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Internal rotation failures, logged and converted to `false` at the public boundary
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("Source '{source_id}' rejected: {reason}")]
    SourceFetch { source_id: String, reason: String },
    #[error("Bundle contains {found} certificates, at least {required} required")]
    BundleValidation { found: usize, required: usize },
    #[error("No certificate source produced a valid bundle")]
    AllSourcesFailed,
    #[error("Failed to persist {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not set permissions on {0:?}")]
    Permission(PathBuf),
    #[error("Rotation already in progress (lock held at {0:?})")]
    LockHeld(PathBuf),
    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),
}

/// Classification of a failed outbound call at the transport level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    InvalidUrl,
    Connect,
    Timeout,
    Tls,
    Proxy,
    Protocol,
    Io,
    /// The request function panicked; folded into a failed attempt
    Panicked,
}

impl TransportErrorKind {
    fn label(self) -> &'static str {
        match self {
            TransportErrorKind::InvalidUrl => "invalid url",
            TransportErrorKind::Connect => "connect error",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Tls => "ssl error",
            TransportErrorKind::Proxy => "proxy error",
            TransportErrorKind::Protocol => "protocol error",
            TransportErrorKind::Io => "io error",
            TransportErrorKind::Panicked => "request function panicked",
        }
    }
}

/// Structured transport-level error returned by a `Fetch` implementation
///
/// The display text is what the retry classifier inspects, so it always
/// starts with the kind label ("connect error", "timeout", "ssl error", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Tls, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    pub fn io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::timeout(error.to_string())
            }
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => Self::connect(error.to_string()),
            _ => Self::new(TransportErrorKind::Io, error.to_string()),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

impl std::error::Error for TransportError {}
