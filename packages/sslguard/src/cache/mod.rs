//! Two-tier certificate cache
//!
//! Certificates are keyed by the SHA-256 of their locator (a local path or a
//! URL). Lookups go memory tier, then disk tier, then a fresh load; every
//! successful load is written through both tiers.

pub mod certificate_cache;
pub mod memory;
pub mod stats;

pub use certificate_cache::{CERTIFICATE_FETCH_TIMEOUT, CertificateCache, DEFAULT_CACHE_TTL, cache_key};
pub use memory::{MemoryTier, SkipMapTier};
pub use stats::CacheStats;
