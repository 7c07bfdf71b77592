// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry and timeout policies per activity class.
//!
//! Hot-loop prevention is structural: initial delay is never below one
//! second, the backoff factor never below two, and attempts are always
//! bounded. Rate-limit errors override the computed backoff with the
//! server-supplied delay.

use apc_error::ApError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout and retry configuration for one activity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Hard wall-clock cap on a single attempt.
    pub start_to_close: Duration,
    /// Liveness window for long-running activities. Must be strictly less
    /// than `start_to_close` when set.
    pub heartbeat_timeout: Option<Duration>,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied per subsequent attempt.
    pub backoff_factor: u32,
    /// Cap on the computed delay.
    pub max_delay: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Database writes: `persist_*`, `update_*`, `log_progress`.
    #[must_use]
    pub fn db_write() -> Self {
        Self {
            start_to_close: Duration::from_secs(30),
            heartbeat_timeout: None,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }

    /// PDF page categorization.
    #[must_use]
    pub fn split_pdf() -> Self {
        Self {
            start_to_close: Duration::from_secs(60),
            max_attempts: 3,
            ..Self::db_write()
        }
    }

    /// Vision extraction: slow external calls with heartbeats.
    #[must_use]
    pub fn extraction() -> Self {
        Self {
            start_to_close: Duration::from_secs(300),
            heartbeat_timeout: Some(Duration::from_secs(30)),
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }

    /// Per-invoice validation.
    #[must_use]
    pub fn validation() -> Self {
        Self {
            max_attempts: 3,
            ..Self::db_write()
        }
    }

    /// Package reconciliation: deterministic, so replays are free.
    #[must_use]
    pub fn reconciliation() -> Self {
        Self {
            start_to_close: Duration::from_secs(120),
            max_attempts: 3,
            ..Self::db_write()
        }
    }

    /// Entity and vendor resolution.
    #[must_use]
    pub fn resolution() -> Self {
        Self {
            start_to_close: Duration::from_secs(60),
            max_attempts: 3,
            ..Self::db_write()
        }
    }

    /// Mapping overlay and payload construction.
    #[must_use]
    pub fn mapping() -> Self {
        Self {
            max_attempts: 3,
            ..Self::db_write()
        }
    }

    /// Backoff delay before the attempt *after* `attempt` (1-based), taking a
    /// rate-limit override into account.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, error: &ApError) -> Duration {
        if let Some(after) = error.retry_after() {
            return after;
        }
        let factor = self.backoff_factor.max(2).saturating_pow(attempt.saturating_sub(1));
        let millis = (self.initial_delay.as_millis() as u64).saturating_mul(u64::from(factor));
        Duration::from_millis(millis).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_the_contract() {
        assert_eq!(RetryPolicy::db_write().start_to_close, Duration::from_secs(30));
        assert_eq!(RetryPolicy::db_write().max_attempts, 5);
        assert_eq!(RetryPolicy::split_pdf().start_to_close, Duration::from_secs(60));
        assert_eq!(RetryPolicy::split_pdf().max_attempts, 3);
        assert_eq!(RetryPolicy::extraction().start_to_close, Duration::from_secs(300));
        assert_eq!(
            RetryPolicy::extraction().heartbeat_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(RetryPolicy::reconciliation().start_to_close, Duration::from_secs(120));
        assert_eq!(RetryPolicy::resolution().start_to_close, Duration::from_secs(60));
        assert_eq!(RetryPolicy::mapping().start_to_close, Duration::from_secs(30));
    }

    #[test]
    fn heartbeat_windows_are_strictly_inside_start_to_close() {
        for policy in [
            RetryPolicy::db_write(),
            RetryPolicy::split_pdf(),
            RetryPolicy::extraction(),
            RetryPolicy::validation(),
            RetryPolicy::reconciliation(),
            RetryPolicy::resolution(),
            RetryPolicy::mapping(),
        ] {
            if let Some(heartbeat) = policy.heartbeat_timeout {
                assert!(heartbeat < policy.start_to_close);
            }
            assert!(policy.initial_delay >= Duration::from_secs(1));
            assert!(policy.backoff_factor >= 2);
            assert!(policy.max_attempts >= 1);
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::db_write();
        let err = ApError::transient("lock");
        assert_eq!(policy.delay_after(1, &err), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2, &err), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3, &err), Duration::from_secs(4));
        assert_eq!(policy.delay_after(10, &err), Duration::from_secs(30));
    }

    #[test]
    fn rate_limit_overrides_backoff() {
        let policy = RetryPolicy::extraction();
        let err = ApError::RateLimited {
            retry_after: Duration::from_secs(17),
        };
        assert_eq!(policy.delay_after(1, &err), Duration::from_secs(17));
    }
}
