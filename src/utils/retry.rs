use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

/// Bounded retry budget shared by the feed and webhook clients.
///
/// `max_retries` counts retries after the first attempt, so a policy with
/// `max_retries = 5` issues at most six requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
                self.base_delay
                    .checked_mul(factor)
                    .unwrap_or(self.max_delay)
            }
        };
        delay.min(self.max_delay)
    }

    /// Server-suggested delay (e.g. `Retry-After`), still bounded by `max_delay`.
    pub fn clamp(&self, suggested: Duration) -> Duration {
        suggested.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays_double_until_capped() {
        let policy =
            RetryPolicy::exponential(5, Duration::from_millis(500), Duration::from_secs(3));

        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(1, Duration::from_secs(2));

        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(7), Duration::from_secs(2));
    }

    #[test]
    fn test_clamp_bounds_server_suggestion() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1), Duration::from_secs(10));

        assert_eq!(policy.clamp(Duration::from_secs(4)), Duration::from_secs(4));
        assert_eq!(policy.clamp(Duration::from_secs(600)), Duration::from_secs(10));
    }
}
