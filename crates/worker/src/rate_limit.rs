//! Fixed-window execution rate limiter.

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started: Instant,
    used: u32,
}

/// Global limiter over route executions: `max` slots per `window`, counters
/// reset at the window boundary.
pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    retry_interval: Duration,
    state: Mutex<Window>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration, retry_interval: Duration) -> Self {
        Self {
            max: max.max(1),
            window,
            retry_interval,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// One slot per minute-window with a 200ms polling interval.
    pub fn per_minute(max: u32) -> Self {
        Self::new(max, Duration::from_secs(60), Duration::from_millis(200))
    }

    /// Claim a slot in the current window if one is free.
    pub fn try_acquire(&self) -> bool {
        let mut window = self.state.lock().expect("limiter lock poisoned");
        let now = Instant::now();
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.used = 0;
        }
        if window.used < self.max {
            window.used += 1;
            true
        } else {
            false
        }
    }

    /// Yield until a slot frees up at the next window boundary.
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(self.retry_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_slots_per_window() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60), Duration::from_millis(1));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        let limiter = FixedWindowLimiter::new(0, Duration::from_secs(60), Duration::from_millis(1));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn window_boundary_resets_counters() {
        let limiter =
            FixedWindowLimiter::new(1, Duration::from_millis(30), Duration::from_millis(1));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn acquire_waits_for_next_window() {
        let limiter =
            FixedWindowLimiter::new(1, Duration::from_millis(50), Duration::from_millis(5));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
