//! Per-user sliding-window rate limiter for in-match answers (spec §4.5 step 5).
//!
//! Distinct on purpose from the teacher's `TokenBucket` (`middleware/rate_limit.rs`):
//! that limiter refills continuously, this one counts attempts in a trailing window and
//! must evict on every check, since the spec's wording ("maintain a deque of answer
//! timestamps, evict entries older than W") is an explicit sliding-window algorithm,
//! not a bucket.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Bound on the per-user deque so a user who never sleeps can't grow memory forever
/// (design note: "both the per-match event queue and the per-user rate-limit deque
/// must be bounded").
const MAX_TRACKED: usize = 64;

pub struct RateLimiter {
    window: Duration,
    max_in_window: usize,
    attempts: HashMap<crate::models::UserId, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_in_window: usize) -> Self {
        Self {
            window,
            max_in_window,
            attempts: HashMap::new(),
        }
    }

    /// Returns `true` if the attempt is allowed (and records it); `false` if the user
    /// is currently rate-limited (and the attempt is not counted).
    pub fn check_and_record(&mut self, user_id: crate::models::UserId, now: Instant) -> bool {
        let deque = self.attempts.entry(user_id).or_default();

        while let Some(&oldest) = deque.front() {
            if now.saturating_duration_since(oldest) > self.window {
                deque.pop_front();
            } else {
                break;
            }
        }

        if deque.len() >= self.max_in_window {
            return false;
        }

        deque.push_back(now);
        while deque.len() > MAX_TRACKED {
            deque.pop_front();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_blocks() {
        let mut rl = RateLimiter::new(Duration::from_secs(10), 3);
        let t0 = Instant::now();
        assert!(rl.check_and_record(1, t0));
        assert!(rl.check_and_record(1, t0 + Duration::from_millis(100)));
        assert!(rl.check_and_record(1, t0 + Duration::from_millis(200)));
        assert!(!rl.check_and_record(1, t0 + Duration::from_millis(300)));
    }

    #[test]
    fn window_eviction_allows_again() {
        let mut rl = RateLimiter::new(Duration::from_secs(10), 3);
        let t0 = Instant::now();
        for i in 0..3 {
            assert!(rl.check_and_record(1, t0 + Duration::from_millis(i * 100)));
        }
        assert!(!rl.check_and_record(1, t0 + Duration::from_secs(1)));
        assert!(rl.check_and_record(1, t0 + Duration::from_secs(11)));
    }

    #[test]
    fn users_tracked_independently() {
        let mut rl = RateLimiter::new(Duration::from_secs(10), 1);
        let t0 = Instant::now();
        assert!(rl.check_and_record(1, t0));
        assert!(rl.check_and_record(2, t0));
        assert!(!rl.check_and_record(1, t0));
    }
}
