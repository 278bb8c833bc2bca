use std::time::Duration;

/// Bounded retry policy for transient persistence failures.
///
/// A pure decision function: given the attempt number that just failed,
/// returns the backoff to wait before the next attempt, or `None` when the
/// budget is exhausted. Attempt numbers start at 1.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff, doubling per failed attempt, capped at
    /// `max_backoff`.
    pub fn backoff_after(&self, failed_attempt: u32) -> Option<Duration> {
        if failed_attempt >= self.max_attempts {
            return None;
        }
        let exp = failed_attempt.saturating_sub(1).min(20);
        let backoff = self.base_backoff.saturating_mul(1u32 << exp);
        Some(backoff.min(self.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_exhaustion() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff_after(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.backoff_after(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.backoff_after(3), None);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        };
        assert_eq!(policy.backoff_after(9), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_after(1), None);
    }
}
