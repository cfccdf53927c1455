//! Per-sequence retry statistics

use std::time::{Duration, Instant};

/// Statistics for one `execute_with_retry` sequence
#[derive(Debug, Clone)]
pub struct RetryStats {
    /// Total number of attempts made
    pub total_attempts: u32,
    /// Number of successful retries
    pub successful_retries: u32,
    /// Total time spent in attempts (excluding delays)
    pub total_retry_time: Duration,
    /// Total time spent waiting between attempts
    pub total_delay_time: Duration,
    /// When the sequence started
    pub start_time: Instant,
    /// When the sequence ended
    pub end_time: Option<Instant>,
    /// Failures observed along the way
    pub retry_errors: Vec<String>,
}

impl Default for RetryStats {
    fn default() -> Self {
        Self {
            total_attempts: 0,
            successful_retries: 0,
            total_retry_time: Duration::ZERO,
            total_delay_time: Duration::ZERO,
            start_time: Instant::now(),
            end_time: None,
            retry_errors: Vec::new(),
        }
    }
}

impl RetryStats {
    /// Mark the sequence as completed
    #[inline]
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Wall-clock time from start to completion (or to now while running)
    #[inline]
    pub fn total_elapsed(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stats_are_empty() {
        let stats = RetryStats::default();
        assert_eq!(stats.total_attempts, 0);
        assert!(stats.end_time.is_none());
        assert!(stats.retry_errors.is_empty());
    }

    #[test]
    fn completed_sequences_have_fixed_elapsed_time() {
        let mut stats = RetryStats::default();
        stats.complete();
        let first = stats.total_elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.total_elapsed(), first);
    }
}
