use std::time::Duration;

use crate::sleeper::Sleeper;

/// Bounded exponential backoff.
///
/// An operation is tried once, then retried after `initial_delay`, doubling
/// up to `max_delay`, until it succeeds, `max_attempts` is reached, or the
/// accumulated wait would exceed `max_total_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_total_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(400),
            max_total_wait: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub waited: Duration,
    pub last_error: E,
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_max_total_wait(mut self, wait: Duration) -> Self {
        self.max_total_wait = wait;
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    pub async fn run<T, E, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Result<T, E> + Send,
        E: Send,
    {
        let mut attempt = 1;
        let mut waited = Duration::ZERO;
        loop {
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let delay = self.delay_for(attempt - 1);
            if attempt >= self.max_attempts || waited + delay > self.max_total_wait {
                return Err(RetryExhausted {
                    attempts: attempt,
                    waited,
                    last_error: err,
                });
            }

            sleeper.sleep(delay).await;
            waited += delay;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::MockSleeper;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(25));
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(5), Duration::from_millis(400));
        assert_eq!(policy.delay_for(40), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_sleep() {
        let sleeper = MockSleeper::new();
        let result: Result<u32, RetryExhausted<()>> =
            RetryPolicy::default().run(&sleeper, |attempt| Ok(attempt)).await;
        assert_eq!(result, Ok(1));
        assert_eq!(sleeper.call_count(), 0);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let sleeper = MockSleeper::new();
        let result = RetryPolicy::default()
            .run(&sleeper, |attempt| if attempt < 3 { Err("not yet") } else { Ok(attempt) })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(
            sleeper.durations(),
            vec![Duration::from_millis(25), Duration::from_millis(50)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sleeper = MockSleeper::new();
        let policy = RetryPolicy::default().with_max_attempts(3);
        let result: Result<(), _> = policy.run(&sleeper, |_| Err("never")).await;
        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last_error, "never");
        assert_eq!(sleeper.call_count(), 2);
    }

    #[tokio::test]
    async fn test_total_wait_is_bounded() {
        let sleeper = MockSleeper::new();
        let policy = RetryPolicy::default()
            .with_max_attempts(100)
            .with_max_total_wait(Duration::from_millis(200));
        let result: Result<(), _> = policy.run(&sleeper, |_| Err(())).await;
        let exhausted = result.unwrap_err();
        assert!(exhausted.waited <= Duration::from_millis(200));
        assert_eq!(sleeper.total_duration(), exhausted.waited);
        // 25 + 50 + 100 = 175; the next 200ms step would overshoot.
        assert_eq!(exhausted.attempts, 4);
    }
}
