//! Timeout configuration record and per-call resolution

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::{ErrorPolicy, ErrorType};
use crate::error::SetupError;

/// Per-host replacement values, each optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOverride {
    pub timeout: Option<f64>,
    pub connect_timeout: Option<f64>,
    pub ssl_handshake_timeout: Option<f64>,
    pub max_retries: Option<u32>,
}

/// Persisted timeout, retry and latency-threshold settings
///
/// All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default_timeout: f64,
    pub connect_timeout: f64,
    pub ssl_handshake_timeout: f64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub jitter: f64,
    pub timeout_hosts: BTreeMap<String, HostOverride>,
    /// Whole-request timeout keyed by upper-case method name
    pub method_timeouts: BTreeMap<String, f64>,
    pub error_policies: BTreeMap<ErrorType, ErrorPolicy>,
    pub latency_warning_threshold: f64,
    pub latency_critical_threshold: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let method_timeouts = [
            ("GET", 30.0),
            ("HEAD", 15.0),
            ("POST", 60.0),
            ("PUT", 60.0),
            ("PATCH", 60.0),
            ("DELETE", 30.0),
        ]
        .into_iter()
        .map(|(method, seconds)| (method.to_string(), seconds))
        .collect();

        let error_policies = [
            (ErrorType::ConnectionTimeout, ErrorPolicy { max_retries: 3, backoff_factor: 2.0 }),
            (ErrorType::SslError, ErrorPolicy { max_retries: 1, backoff_factor: 1.0 }),
            (ErrorType::ServerError, ErrorPolicy { max_retries: 3, backoff_factor: 1.5 }),
            (ErrorType::ClientError, ErrorPolicy { max_retries: 0, backoff_factor: 1.0 }),
        ]
        .into_iter()
        .collect();

        Self {
            default_timeout: 30.0,
            connect_timeout: 10.0,
            ssl_handshake_timeout: 10.0,
            max_retries: 3,
            backoff_factor: 1.5,
            jitter: 0.1,
            timeout_hosts: BTreeMap::new(),
            method_timeouts,
            error_policies,
            latency_warning_threshold: 5.0,
            latency_critical_threshold: 15.0,
        }
    }
}

impl TimeoutConfig {
    /// Reject values that would make backoff or timeouts meaningless
    pub fn validate(&self) -> Result<(), SetupError> {
        let positive = [
            ("default_timeout", self.default_timeout),
            ("connect_timeout", self.connect_timeout),
            ("ssl_handshake_timeout", self.ssl_handshake_timeout),
            ("backoff_factor", self.backoff_factor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SetupError::InvalidArgument(format!(
                    "{name} must be a positive number of seconds, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SetupError::InvalidArgument(format!(
                "jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            )));
        }
        if self.latency_critical_threshold < self.latency_warning_threshold {
            return Err(SetupError::InvalidArgument(
                "latency_critical_threshold cannot be below latency_warning_threshold".to_string(),
            ));
        }
        Ok(())
    }

    /// Policy for an error class, global retry settings when none is configured
    pub fn error_policy(&self, error_type: ErrorType) -> ErrorPolicy {
        self.error_policies
            .get(&error_type)
            .copied()
            .unwrap_or(ErrorPolicy {
                max_retries: self.max_retries,
                backoff_factor: self.backoff_factor,
            })
    }

    /// Effective values for one call: globals, then method, then host
    pub fn resolve(&self, url: &str, method: &str) -> ResolvedTimeouts {
        let mut resolved = ResolvedTimeouts {
            timeout: seconds(self.default_timeout),
            connect_timeout: seconds(self.connect_timeout),
            ssl_handshake_timeout: seconds(self.ssl_handshake_timeout),
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
        };

        if let Some(&method_timeout) = self.method_timeouts.get(&method.to_ascii_uppercase()) {
            resolved.timeout = seconds(method_timeout);
        }

        if let Some(host) = host_of(url)
            && let Some(host_override) = self.timeout_hosts.get(&host)
        {
            if let Some(timeout) = host_override.timeout {
                resolved.timeout = seconds(timeout);
            }
            if let Some(connect) = host_override.connect_timeout {
                resolved.connect_timeout = seconds(connect);
            }
            if let Some(handshake) = host_override.ssl_handshake_timeout {
                resolved.ssl_handshake_timeout = seconds(handshake);
            }
            if let Some(max_retries) = host_override.max_retries {
                resolved.max_retries = max_retries;
            }
        }

        resolved
    }
}

/// Timeout settings resolved for a single URL and method
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTimeouts {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub ssl_handshake_timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub jitter: f64,
}

/// Lower-cased host of `url`, `None` when it does not parse
pub(crate) fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_override_beats_method_override_beats_default() {
        let mut config = TimeoutConfig::default();
        config.default_timeout = 30.0;
        config.method_timeouts.insert("POST".to_string(), 60.0);
        config.timeout_hosts.insert(
            "slow.example".to_string(),
            HostOverride {
                timeout: Some(120.0),
                max_retries: Some(7),
                ..HostOverride::default()
            },
        );

        let global = config.resolve("https://fast.example/a", "OPTIONS");
        assert_eq!(global.timeout, Duration::from_secs(30));

        let by_method = config.resolve("https://fast.example/a", "post");
        assert_eq!(by_method.timeout, Duration::from_secs(60));

        let by_host = config.resolve("https://slow.example/a", "POST");
        assert_eq!(by_host.timeout, Duration::from_secs(120));
        assert_eq!(by_host.max_retries, 7);
        assert_eq!(by_host.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn unknown_error_type_falls_back_to_globals() {
        let config = TimeoutConfig::default();
        let policy = config.error_policy(ErrorType::ConnectionError);
        assert_eq!(policy.max_retries, config.max_retries);
        assert_eq!(policy.backoff_factor, config.backoff_factor);
        assert_eq!(config.error_policy(ErrorType::ConnectionTimeout).backoff_factor, 2.0);
    }

    #[test]
    fn partial_records_fill_defaults() {
        let config: TimeoutConfig =
            serde_json::from_value(serde_json::json!({ "max_retries": 5 })).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.default_timeout, 30.0);
        assert!(config.error_policies.contains_key(&ErrorType::ServerError));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = TimeoutConfig::default();
        config.jitter = 1.5;
        assert!(config.validate().is_err());
        let mut config = TimeoutConfig::default();
        config.backoff_factor = 0.0;
        assert!(config.validate().is_err());
        assert!(TimeoutConfig::default().validate().is_ok());
    }
}
