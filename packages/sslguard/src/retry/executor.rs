//! The retry state machine

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use http::Method;

use super::classify::{Outcome, determine_error_type, is_valid_result};
use super::manager::SslTimeoutManager;
use super::policy::ErrorType;
use super::timeouts::host_of;
use crate::error::{TransportError, TransportErrorKind};
use crate::telemetry::RetryStats;

/// Blocks the calling thread between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Default [`Sleeper`] backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Arguments handed to the request function on every attempt
///
/// Timeouts left unset are filled in from the resolved configuration before
/// the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestArgs {
    pub method: Method,
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl RequestArgs {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            timeout: None,
            connect_timeout: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Default for RequestArgs {
    fn default() -> Self {
        Self::get()
    }
}

/// States of one retry sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting,
    BackoffWait,
    Success,
    Exhausted,
}

impl SslTimeoutManager {
    /// Run `request_fn` until it yields a valid result or the retry budget is spent
    ///
    /// `request_fn` receives the URL, the effective arguments and the zero-based
    /// attempt number. A result is valid when it is `Ok`, not absent, and
    /// carries no HTTP status of 400 or above. After each failure the budget is
    /// re-read from the policy of the observed error type, so a sequence that
    /// moves between error classes follows the latest one. A host override's
    /// `max_retries` takes precedence over every policy. A panic inside
    /// `request_fn` counts as a failed attempt.
    ///
    /// The last observed result is returned when the budget is exhausted.
    pub fn execute_with_retry<T, F>(
        &self,
        mut request_fn: F,
        url: &str,
        args: &RequestArgs,
    ) -> Result<T, TransportError>
    where
        T: Outcome,
        F: FnMut(&str, &RequestArgs, u32) -> Result<T, TransportError>,
    {
        let resolved = self.get_timeout_config(url, args.method.as_str());
        let mut call_args = args.clone();
        call_args.timeout = call_args.timeout.or(Some(resolved.timeout));
        call_args.connect_timeout = call_args.connect_timeout.or(Some(resolved.connect_timeout));

        let host = host_of(url).unwrap_or_else(|| url.to_string());
        let mut last_error_type = ErrorType::ConnectionError;
        let mut stats = RetryStats::default();
        let mut state = RetryState::Attempting;
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                transition(&mut state, RetryState::BackoffWait, url);
                let delay = self.calculate_backoff(attempt, last_error_type);
                tracing::debug!(
                    host = %host,
                    attempt,
                    error_type = %last_error_type,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before retry"
                );
                stats.total_delay_time += delay;
                self.sleeper.sleep(delay);
                transition(&mut state, RetryState::Attempting, url);
            }

            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| request_fn(url, &call_args, attempt)))
                .unwrap_or_else(|payload| {
                    Err(TransportError::new(
                        TransportErrorKind::Panicked,
                        panic_message(payload.as_ref()),
                    ))
                });
            let elapsed = started.elapsed();
            stats.total_attempts += 1;
            stats.total_retry_time += elapsed;
            self.record_latency(&host, args.method.as_str(), elapsed);

            if is_valid_result(&result) {
                transition(&mut state, RetryState::Success, url);
                if attempt > 0 {
                    stats.successful_retries += 1;
                    tracing::info!(host = %host, attempt, "Request succeeded after retry");
                }
                stats.complete();
                tracing::debug!(host = %host, ?stats, "Retry sequence finished");
                return result;
            }

            let error_type = determine_error_type(&result);
            let description = describe(&result);
            tracing::warn!(
                host = %host,
                attempt,
                error_type = %error_type,
                error = %description,
                "Request attempt failed"
            );
            stats.retry_errors.push(description);
            last_error_type = error_type;
            let max_retries = self.retry_budget(url, error_type);

            if attempt >= max_retries {
                transition(&mut state, RetryState::Exhausted, url);
                stats.complete();
                tracing::error!(
                    host = %host,
                    attempts = stats.total_attempts,
                    error_type = %error_type,
                    elapsed_ms = stats.total_elapsed().as_millis() as u64,
                    "Retries exhausted"
                );
                return result;
            }
            attempt += 1;
        }
    }
}

fn transition(state: &mut RetryState, next: RetryState, url: &str) {
    tracing::trace!(url, from = ?*state, to = ?next, "Retry state transition");
    *state = next;
}

fn describe<T: Outcome>(result: &Result<T, TransportError>) -> String {
    match result {
        Err(error) => error.to_string(),
        Ok(value) => match value.status_code() {
            Some(status) => format!("HTTP {status}"),
            None => "empty result".to_string(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
