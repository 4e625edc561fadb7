use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use null_term_common::mutex_lock_or_recover;

/// Time source for retries, so backoff can be tested without real timers.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and records every requested delay.
#[derive(Debug, Default)]
pub struct MockSleeper {
    call_count: AtomicU64,
    durations: Mutex<Vec<Duration>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn total_duration(&self) -> Duration {
        self.durations().iter().sum()
    }

    pub fn durations(&self) -> Vec<Duration> {
        mutex_lock_or_recover(&self.durations).clone()
    }
}

#[async_trait]
impl Sleeper for MockSleeper {
    async fn sleep(&self, duration: Duration) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        mutex_lock_or_recover(&self.durations).push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sleeper_does_not_sleep() {
        let sleeper = MockSleeper::new();
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_secs(10)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(sleeper.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_sleeper_tracks_durations() {
        let sleeper = MockSleeper::new();
        sleeper.sleep(Duration::from_millis(10)).await;
        sleeper.sleep(Duration::from_millis(20)).await;
        assert_eq!(
            sleeper.durations(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(sleeper.total_duration(), Duration::from_millis(30));
    }
}
