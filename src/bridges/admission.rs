//! Sliding-window per-sender admission control (spec §4.4, §5 "Shared-resource
//! policy"): a default 1-minute window, configurable per-minute cap, zero
//! disables. Timestamps live in an in-process mutex-protected map; a
//! periodic sweep bounds its growth.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by sender identifier.
pub struct RateLimiter {
    per_minute_cap: u32,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    /// `per_minute_cap == 0` disables admission control (always allow).
    pub fn new(per_minute_cap: u32) -> Self {
        RateLimiter {
            per_minute_cap,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt for `sender`; returns `true` if admitted.
    pub fn admit(&self, sender: &str) -> bool {
        if self.per_minute_cap == 0 {
            return true;
        }

        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap();
        let entry = hits.entry(sender.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);

        if entry.len() as u32 >= self.per_minute_cap {
            false
        } else {
            entry.push(now);
            true
        }
    }

    /// Evict senders whose most recent hit is older than two windows, bounding
    /// map growth (spec: "a periodic sweep every 10 min").
    pub fn sweep(&self) {
        let now = Instant::now();
        let stale_after = WINDOW * 2;
        let mut hits = self.hits.lock().unwrap();
        hits.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < WINDOW);
            timestamps
                .last()
                .map(|t| now.duration_since(*t) < stale_after)
                .unwrap_or(false)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_cap_disables_limiting() {
        let limiter = RateLimiter::new(0);
        for _ in 0..100 {
            assert!(limiter.admit("alice"));
        }
    }

    #[test]
    fn test_cap_enforced_per_sender() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.admit("alice"));
        assert!(limiter.admit("alice"));
        assert!(!limiter.admit("alice"));
        assert!(limiter.admit("bob"));
    }

    #[test]
    fn test_sweep_clears_stale_entries() {
        let limiter = RateLimiter::new(1);
        limiter.admit("alice");
        {
            let mut hits = limiter.hits.lock().unwrap();
            hits.get_mut("alice").unwrap()[0] = Instant::now() - Duration::from_secs(300);
        }
        limiter.sweep();
        assert!(limiter.hits.lock().unwrap().is_empty());
    }
}
