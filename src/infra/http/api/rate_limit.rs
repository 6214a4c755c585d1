use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding-window request counter keyed by client.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the oldest counted request leaves the window.
    pub retry_after_secs: u64,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn allow(&self, key: &str) -> RateDecision {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> RateDecision {
        let window = self.window;
        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        let used = u32::try_from(entry.len()).unwrap_or(u32::MAX);
        if used >= self.max_requests {
            let retry_after = entry
                .first()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: ceil_secs(retry_after),
            };
        }

        entry.push(now);
        RateDecision {
            allowed: true,
            remaining: self.max_requests - used - 1,
            retry_after_secs: 0,
        }
    }

    /// Drops clients with no request inside the current window.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.buckets.retain(|_, hits| {
            hits.retain(|instant| now.duration_since(*instant) < window);
            !hits.is_empty()
        });
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    let rounded = if duration.subsec_nanos() > 0 { secs + 1 } else { secs };
    rounded.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_within_window() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 2);
        let start = Instant::now();

        let first = limiter.allow_at("10.0.0.1", start);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.allow_at("10.0.0.1", start + Duration::from_secs(1)).allowed);

        let denied = limiter.allow_at("10.0.0.1", start + Duration::from_secs(10));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, 50);

        assert!(limiter.allow_at("10.0.0.2", start).allowed);
    }

    #[test]
    fn window_slides() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 1);
        let start = Instant::now();

        assert!(limiter.allow_at("client", start).allowed);
        assert!(!limiter.allow_at("client", start + Duration::from_secs(59)).allowed);
        assert!(limiter.allow_at("client", start + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn prune_forgets_idle_clients() {
        let limiter = ApiRateLimiter::new(Duration::from_millis(1), 5);
        limiter.allow_at("old", Instant::now() - Duration::from_secs(1));
        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
