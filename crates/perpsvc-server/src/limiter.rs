//! Connection and request limiters.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caps concurrent market stream connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// The guard owns an `Arc` so it can move into the upgraded socket task.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Fixed-window call counter keyed by user.
pub struct WindowLimiter {
    max: u32,
    window: Duration,
    windows: DashMap<String, (Instant, u32)>,
}

impl WindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            windows: DashMap::new(),
        }
    }

    /// Count one call for `key`; false once the window is used up.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entry = self.windows.entry(key.to_string()).or_insert((now, 0));
        let (started, count) = *entry;
        if now.saturating_duration_since(started) >= self.window {
            *entry = (now, 1);
            return true;
        }
        if count >= self.max {
            return false;
        }
        entry.1 = count + 1;
        true
    }

    /// Drop windows that have expired.
    pub fn prune(&self, now: Instant) {
        self.windows
            .retain(|_, (started, _)| now.saturating_duration_since(*started) < self.window);
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_limit() {
        let limiter = Arc::new(ConnectionLimiter::new(2));
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.current_count(), 2);

        drop(a);
        assert_eq!(limiter.current_count(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn test_window_limit_per_key() {
        let limiter = WindowLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("alice", t0));
        }
        assert!(!limiter.check_at("alice", t0 + Duration::from_secs(59)));
        assert!(limiter.check_at("bob", t0));
    }

    #[test]
    fn test_window_resets() {
        let limiter = WindowLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.check_at("alice", t0));
        assert!(!limiter.check_at("alice", t0 + Duration::from_secs(1)));
        assert!(limiter.check_at("alice", t0 + Duration::from_secs(60)));
        assert!(!limiter.check_at("alice", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_prune() {
        let limiter = WindowLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        limiter.check_at("alice", t0);
        limiter.check_at("bob", t0 + Duration::from_secs(5));
        limiter.prune(t0 + Duration::from_secs(12));
        assert_eq!(limiter.tracked(), 1);
    }
}
