//! Per-host latency history

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Entries retained per host
pub const LATENCY_HISTORY_CAPACITY: usize = 100;

/// One measured call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub host: String,
    pub method: String,
    pub latency_seconds: f64,
    /// Unix seconds
    pub timestamp: i64,
}

/// Aggregate latency over a host or over every host
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub requests: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub last_timestamp: Option<i64>,
}

/// Capped ring buffer of latency records per host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatencyHistory {
    hosts: HashMap<String, VecDeque<LatencyRecord>>,
}

impl LatencyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, evicting the oldest beyond capacity
    pub fn push(&mut self, record: LatencyRecord) {
        let ring = self.hosts.entry(record.host.clone()).or_default();
        ring.push_back(record);
        while ring.len() > LATENCY_HISTORY_CAPACITY {
            ring.pop_front();
        }
    }

    pub fn records(&self, host: &str) -> impl Iterator<Item = &LatencyRecord> {
        self.hosts.get(host).into_iter().flatten()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
    }

    /// Stats for `host`, or across all hosts when `None`
    pub fn stats(&self, host: Option<&str>) -> LatencyStats {
        match host {
            Some(host) => aggregate(self.records(host)),
            None => aggregate(self.hosts.values().flatten()),
        }
    }

    /// Re-apply the per-host cap, used after loading a persisted history
    pub fn enforce_capacity(&mut self) {
        for ring in self.hosts.values_mut() {
            while ring.len() > LATENCY_HISTORY_CAPACITY {
                ring.pop_front();
            }
        }
    }
}

fn aggregate<'a>(records: impl Iterator<Item = &'a LatencyRecord>) -> LatencyStats {
    let mut stats = LatencyStats {
        min: f64::INFINITY,
        max: 0.0,
        ..LatencyStats::default()
    };
    let mut total = 0.0;
    for record in records {
        stats.requests += 1;
        total += record.latency_seconds;
        stats.min = stats.min.min(record.latency_seconds);
        stats.max = stats.max.max(record.latency_seconds);
        stats.last_timestamp = Some(stats.last_timestamp.map_or(record.timestamp, |t| t.max(record.timestamp)));
    }
    if stats.requests == 0 {
        return LatencyStats::default();
    }
    stats.average = total / stats.requests as f64;
    stats
}
