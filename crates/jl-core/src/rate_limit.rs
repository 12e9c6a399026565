use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Fixed-window counter keyed by caller (for example `login:203.0.113.7`).
#[derive(Default)]
pub struct RateLimiter {
    inner: Mutex<HashMap<String, RateState>>,
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub retry_after: Option<Duration>,
}

struct RateState {
    window_start: Instant,
    count: u64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check(&self, key: &str, limit: u64, window: Duration) -> RateLimitOutcome {
        if limit == 0 {
            return RateLimitOutcome {
                allowed: false,
                retry_after: Some(window),
            };
        }

        let mut guard = self.inner.lock().await;
        if guard.len() > 10_000 {
            guard.retain(|_, state| state.window_start.elapsed() < window);
        }
        let entry = guard.entry(key.to_string()).or_insert_with(|| RateState {
            window_start: Instant::now(),
            count: 0,
        });

        if entry.window_start.elapsed() >= window {
            entry.window_start = Instant::now();
            entry.count = 0;
        }

        entry.count += 1;
        if entry.count > limit {
            let retry_after = window.saturating_sub(entry.window_start.elapsed());
            return RateLimitOutcome {
                allowed: false,
                retry_after: Some(retry_after),
            };
        }

        RateLimitOutcome {
            allowed: true,
            retry_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        let first = limiter.check("login:127.0.0.1", 2, window).await;
        assert!(first.allowed);
        assert!(first.retry_after.is_none());

        let second = limiter.check("login:127.0.0.1", 2, window).await;
        assert!(second.allowed);

        let third = limiter.check("login:127.0.0.1", 2, window).await;
        assert!(!third.allowed);
        assert!(third.retry_after.is_some());
    }

    #[tokio::test]
    async fn keys_are_counted_independently() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        assert!(limiter.check("login:10.0.0.1", 1, window).await.allowed);
        assert!(!limiter.check("login:10.0.0.1", 1, window).await.allowed);
        assert!(limiter.check("login:10.0.0.2", 1, window).await.allowed);
    }

    #[tokio::test]
    async fn window_expiry_resets_count() {
        let limiter = RateLimiter::new();
        let window = Duration::from_millis(20);

        assert!(limiter.check("register:10.0.0.1", 1, window).await.allowed);
        assert!(!limiter.check("register:10.0.0.1", 1, window).await.allowed);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("register:10.0.0.1", 1, window).await.allowed);
    }

    #[tokio::test]
    async fn zero_limit_always_blocks() {
        let limiter = RateLimiter::new();
        let outcome = limiter
            .check("login:10.0.0.1", 0, Duration::from_secs(60))
            .await;
        assert!(!outcome.allowed);
    }
}
