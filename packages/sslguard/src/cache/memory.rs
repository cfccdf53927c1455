//! In-memory cache tier

use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

/// Expiring key-value storage backing the memory tier
pub trait MemoryTier: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;
    fn set(&self, key: &str, value: Bytes, ttl: Duration);
    fn delete(&self, key: &str);
    /// Remove every entry in this tier
    fn flush(&self);
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// Lock-free [`MemoryTier`] on a crossbeam `SkipMap`
#[derive(Default)]
pub struct SkipMapTier {
    entries: SkipMap<String, Entry>,
}

impl SkipMapTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for SkipMapTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipMapTier").field("entries", &self.entries.len()).finish()
    }
}

impl MemoryTier for SkipMapTier {
    fn get(&self, key: &str) -> Option<Bytes> {
        let entry = self.entries.get(key)?;
        if entry.value().expires_at <= Instant::now() {
            entry.remove();
            return None;
        }
        Some(entry.value().value.clone())
    }

    fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(365 * 86_400));
        self.entries.insert(key.to_string(), Entry { value, expires_at });
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn flush(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire() {
        let tier = SkipMapTier::new();
        tier.set("live", Bytes::from_static(b"a"), Duration::from_secs(60));
        tier.set("dead", Bytes::from_static(b"b"), Duration::ZERO);

        assert_eq!(tier.get("live").as_deref(), Some(&b"a"[..]));
        assert!(tier.get("dead").is_none());
        assert_eq!(tier.len(), 1);

        tier.flush();
        assert!(tier.is_empty());
    }
}
