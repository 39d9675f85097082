//! Fixed-window rate limiting keyed by sender.
//!
//! One limiter instance exists per entry surface (Slack senders, chat client
//! addresses), each constructed from its own [`RateLimitPolicy`]. State is
//! process-local and advisory: it is lost on restart and not shared between
//! instances.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_per_window: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn per_minute(max_per_window: u32) -> Self {
        Self { max_per_window, window: Duration::from_secs(60) }
    }
}

/// Counter for one sender within its current window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { policy, entries: Mutex::new(HashMap::new()) }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Records one message from `key` and reports whether it is within the
    /// ceiling for the current window.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if now < entry.window_reset_at => {
                entry.count = entry.count.saturating_add(1);
                entry.count <= self.policy.max_per_window
            }
            _ => {
                entries.insert(
                    key.to_owned(),
                    RateLimitEntry { count: 1, window_reset_at: now + self.policy.window },
                );
                self.policy.max_per_window >= 1
            }
        }
    }

    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.lock().get(key).copied()
    }

    /// Drops every sender whose window has already ended. Returns the number
    /// of entries removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.window_reset_at);
        before - entries.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{RateLimitPolicy, RateLimiter};

    #[test]
    fn allows_up_to_ceiling_then_rejects_within_window() {
        let limiter = RateLimiter::new(RateLimitPolicy::per_minute(30));
        let start = Instant::now();

        for offset in 0..30 {
            assert!(
                limiter.check_at("U1", start + Duration::from_secs(offset)),
                "message {offset} should be allowed"
            );
        }

        assert!(!limiter.check_at("U1", start + Duration::from_secs(59)));
        assert_eq!(limiter.entry("U1").map(|entry| entry.count), Some(31));
    }

    #[test]
    fn window_resets_exactly_at_window_end() {
        let limiter = RateLimiter::new(RateLimitPolicy {
            max_per_window: 1,
            window: Duration::from_millis(60_000),
        });
        let start = Instant::now();

        assert!(limiter.check_at("U1", start));
        assert!(!limiter.check_at("U1", start + Duration::from_millis(59_999)));
        assert!(limiter.check_at("U1", start + Duration::from_millis(60_000)));

        let entry = limiter.entry("U1").expect("entry");
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_reset_at, start + Duration::from_millis(120_000));
    }

    #[test]
    fn two_messages_sixty_one_seconds_apart_both_pass() {
        let limiter = RateLimiter::new(RateLimitPolicy::per_minute(30));
        let start = Instant::now();

        assert!(limiter.check_at("U1", start));
        assert!(limiter.check_at("U1", start + Duration::from_secs(61)));
    }

    #[test]
    fn senders_are_counted_independently() {
        let limiter = RateLimiter::new(RateLimitPolicy::per_minute(1));
        let now = Instant::now();

        assert!(limiter.check_at("U1", now));
        assert!(!limiter.check_at("U1", now));
        assert!(limiter.check_at("U2", now));
    }

    #[test]
    fn separate_instances_do_not_share_state() {
        let slack = RateLimiter::new(RateLimitPolicy::per_minute(1));
        let chat = RateLimiter::new(RateLimitPolicy::per_minute(1));
        let now = Instant::now();

        assert!(slack.check_at("same-key", now));
        assert!(chat.check_at("same-key", now));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let limiter = RateLimiter::new(RateLimitPolicy::per_minute(5));
        let start = Instant::now();

        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::from_secs(30));

        let removed = limiter.sweep_expired_at(start + Duration::from_secs(60));

        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.entry("old").is_none());
        assert!(limiter.entry("fresh").is_some());
    }
}
