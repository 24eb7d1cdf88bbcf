use std::collections::HashMap;

use tokio::sync::RwLock;

use duel_core::types::TimestampMs;

struct RateLimitEntry {
    count: u32,
    window_start: TimestampMs,
}

/// Fixed-window rate limiter, per connection (§4.10). Grounded on the
/// same shape the platform's HTTP-side limiter uses, generalised to take
/// an injected clock instead of `SystemTime::now()` so it matches the
/// rest of this crate's testable, clock-free style.
pub struct RateLimiter {
    windows: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if `key` is still within `max` messages per
    /// `window_ms`, recording this call towards the count.
    pub async fn check(&self, key: &str, max: u32, window_ms: u64, now: TimestampMs) -> bool {
        let mut windows = self.windows.write().await;
        let entry = windows.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.saturating_sub(entry.window_start) >= window_ms {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= max {
            return false;
        }

        entry.count += 1;
        true
    }

    pub async fn forget(&self, key: &str) {
        self.windows.write().await.remove(key);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("conn1", 3, 1_000, 0).await);
        }
        assert!(!limiter.check("conn1", 3, 1_000, 100).await);
    }

    #[tokio::test]
    async fn resets_after_the_window_elapses() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("conn1", 3, 1_000, 0).await);
        }
        assert!(limiter.check("conn1", 3, 1_000, 1_500).await);
    }
}
