//! Disk-tier cache statistics

use std::time::SystemTime;

use serde::Serialize;

/// Disk-tier summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub total_size: u64,
    pub oldest: Option<SystemTime>,
    pub newest: Option<SystemTime>,
}

impl CacheStats {
    pub(crate) fn observe(&mut self, size: u64, modified: SystemTime) {
        self.count += 1;
        self.total_size += size;
        self.oldest = Some(self.oldest.map_or(modified, |oldest| oldest.min(modified)));
        self.newest = Some(self.newest.map_or(modified, |newest| newest.max(modified)));
    }
}
