//! Timeout configuration ownership and latency monitoring

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::executor::{Sleeper, ThreadSleeper};
use super::policy::{ErrorPolicy, ErrorType, backoff_with_jitter};
use super::timeouts::{ResolvedTimeouts, TimeoutConfig, host_of};
use crate::config::{ConfigStore, LATENCY_HISTORY_KEY, TIMEOUT_CONFIG_KEY, load_record, save_record};
use crate::error::{self, StoreError};
use crate::telemetry::{LatencyHistory, LatencyRecord, LatencyStats};

/// Default probability that a recorded latency triggers a history flush
pub const DEFAULT_LATENCY_PERSIST_RATIO: f64 = 0.1;

/// Severity of one latency observation against the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyLevel {
    Normal,
    Warning,
    Critical,
}

/// Owns one [`TimeoutConfig`], the per-host latency history and the retry loop
pub struct SslTimeoutManager {
    config: TimeoutConfig,
    store: Arc<dyn ConfigStore>,
    latency: Mutex<LatencyHistory>,
    latency_persist_ratio: f64,
    pub(super) sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for SslTimeoutManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslTimeoutManager")
            .field("config", &self.config)
            .field("latency_persist_ratio", &self.latency_persist_ratio)
            .finish_non_exhaustive()
    }
}

impl SslTimeoutManager {
    /// Load the persisted configuration and latency history, defaults when absent
    pub fn new(store: Arc<dyn ConfigStore>) -> error::Result<Self> {
        let config = load_record::<TimeoutConfig>(store.as_ref(), TIMEOUT_CONFIG_KEY)?.unwrap_or_default();
        Self::with_config(store, config)
    }

    /// Use an explicit configuration instead of the persisted one
    pub fn with_config(store: Arc<dyn ConfigStore>, config: TimeoutConfig) -> error::Result<Self> {
        config.validate()?;

        let mut history = match load_record::<LatencyHistory>(store.as_ref(), LATENCY_HISTORY_KEY) {
            Ok(history) => history.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable latency history");
                LatencyHistory::new()
            }
        };
        history.enforce_capacity();

        Ok(Self {
            config,
            store,
            latency: Mutex::new(history),
            latency_persist_ratio: DEFAULT_LATENCY_PERSIST_RATIO,
            sleeper: Arc::new(ThreadSleeper),
        })
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Probability in `[0, 1]` that a latency record persists the history
    #[must_use]
    pub fn with_latency_persist_ratio(mut self, ratio: f64) -> Self {
        self.latency_persist_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Replace the configuration after validating it
    pub fn set_config(&mut self, config: TimeoutConfig) -> error::Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Persist the configuration under `ssl_timeout_config`
    pub fn save(&self) -> Result<(), StoreError> {
        save_record(self.store.as_ref(), TIMEOUT_CONFIG_KEY, &self.config)
    }

    /// Effective timeouts for `url` and `method`
    pub fn get_timeout_config(&self, url: &str, method: &str) -> ResolvedTimeouts {
        self.config.resolve(url, method)
    }

    pub fn get_error_policy(&self, error_type: ErrorType) -> ErrorPolicy {
        self.config.error_policy(error_type)
    }

    /// Delay before retry number `retry`, zero for the first attempt
    pub fn calculate_backoff(&self, retry: u32, error_type: ErrorType) -> Duration {
        let policy = self.get_error_policy(error_type);
        backoff_with_jitter(retry, policy.backoff_factor, self.config.jitter)
    }

    /// Retry budget after a failure of `error_type` against `url`
    pub(crate) fn retry_budget(&self, url: &str, error_type: ErrorType) -> u32 {
        host_of(url)
            .and_then(|host| self.config.timeout_hosts.get(&host))
            .and_then(|host_override| host_override.max_retries)
            .unwrap_or_else(|| self.get_error_policy(error_type).max_retries)
    }

    /// Append a latency observation and check it against the thresholds
    pub fn record_latency(&self, host: &str, method: &str, latency: Duration) {
        let latency_seconds = latency.as_secs_f64();
        self.history().push(LatencyRecord {
            host: host.to_string(),
            method: method.to_string(),
            latency_seconds,
            timestamp: chrono::Utc::now().timestamp(),
        });
        self.check_latency_thresholds(host, latency_seconds);

        if self.latency_persist_ratio > 0.0
            && fastrand::f64() < self.latency_persist_ratio
            && let Err(e) = self.flush_latency_history()
        {
            tracing::warn!(error = %e, "Failed to persist latency history");
        }
    }

    /// Log latency above the warning or critical threshold
    pub fn check_latency_thresholds(&self, host: &str, latency_seconds: f64) -> LatencyLevel {
        if latency_seconds > self.config.latency_critical_threshold {
            tracing::error!(
                host,
                latency_seconds,
                threshold = self.config.latency_critical_threshold,
                "Critical latency"
            );
            LatencyLevel::Critical
        } else if latency_seconds > self.config.latency_warning_threshold {
            tracing::warn!(
                host,
                latency_seconds,
                threshold = self.config.latency_warning_threshold,
                "High latency"
            );
            LatencyLevel::Warning
        } else {
            LatencyLevel::Normal
        }
    }

    /// Latency aggregate for one host, or across every host when `None`
    pub fn get_latency_stats(&self, host: Option<&str>) -> LatencyStats {
        self.history().stats(host)
    }

    /// Persist the latency history now
    pub fn flush_latency_history(&self) -> Result<(), StoreError> {
        let snapshot = self.history().clone();
        save_record(self.store.as_ref(), LATENCY_HISTORY_KEY, &snapshot)
    }

    /// Drop the in-memory and persisted latency history
    pub fn clear_latency_history(&self) -> Result<(), StoreError> {
        self.history().clear();
        self.store.delete(LATENCY_HISTORY_KEY)
    }

    fn history(&self) -> MutexGuard<'_, LatencyHistory> {
        match self.latency.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(
                    target: "sslguard::retry",
                    "Latency history mutex poisoned, recovering"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;

    fn manager(store: Arc<MemoryStore>) -> SslTimeoutManager {
        SslTimeoutManager::new(store).unwrap().with_latency_persist_ratio(0.0)
    }

    #[test]
    fn backoff_is_zero_for_first_attempt_and_scales_with_policy() {
        let mut config = TimeoutConfig::default();
        config.jitter = 0.0;
        let manager = SslTimeoutManager::with_config(Arc::new(MemoryStore::new()), config).unwrap();

        assert_eq!(manager.calculate_backoff(0, ErrorType::ConnectionTimeout), Duration::ZERO);
        let timeout = manager.calculate_backoff(2, ErrorType::ConnectionTimeout);
        let generic = manager.calculate_backoff(2, ErrorType::ConnectionError);
        assert_eq!(timeout, Duration::from_secs(4));
        assert_eq!(generic, Duration::from_secs_f64(2.25));
        assert!(timeout > generic);
    }

    #[test]
    fn config_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let mut first = manager(store.clone());
        let mut config = first.config().clone();
        config.max_retries = 9;
        first.set_config(config).unwrap();
        first.save().unwrap();

        let second = manager(store);
        assert_eq!(second.config().max_retries, 9);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = TimeoutConfig::default();
        config.jitter = -0.5;
        assert!(SslTimeoutManager::with_config(Arc::new(MemoryStore::new()), config).is_err());
    }

    #[test]
    fn latency_thresholds() {
        let manager = manager(Arc::new(MemoryStore::new()));
        assert_eq!(manager.check_latency_thresholds("h", 1.0), LatencyLevel::Normal);
        assert_eq!(manager.check_latency_thresholds("h", 6.0), LatencyLevel::Warning);
        assert_eq!(manager.check_latency_thresholds("h", 20.0), LatencyLevel::Critical);
    }

    #[test]
    fn latency_history_flushes_and_clears() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone());
        manager.record_latency("a.example", "GET", Duration::from_millis(250));
        manager.record_latency("a.example", "GET", Duration::from_millis(750));
        assert!(store.get(LATENCY_HISTORY_KEY).unwrap().is_none());

        manager.flush_latency_history().unwrap();
        let reloaded = SslTimeoutManager::new(store.clone()).unwrap();
        let stats = reloaded.get_latency_stats(Some("a.example"));
        assert_eq!(stats.requests, 2);
        assert!((stats.average - 0.5).abs() < 1e-9);

        reloaded.clear_latency_history().unwrap();
        assert_eq!(reloaded.get_latency_stats(None).requests, 0);
        assert!(store.get(LATENCY_HISTORY_KEY).unwrap().is_none());
    }

    #[test]
    fn persist_ratio_of_one_always_flushes() {
        let store = Arc::new(MemoryStore::new());
        let manager = SslTimeoutManager::new(store.clone())
            .unwrap()
            .with_latency_persist_ratio(1.0);
        manager.record_latency("a.example", "GET", Duration::from_millis(10));
        assert!(store.get(LATENCY_HISTORY_KEY).unwrap().is_some());
    }
}
