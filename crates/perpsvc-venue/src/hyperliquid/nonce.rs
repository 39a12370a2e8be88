//! Monotonic millisecond nonces for exchange actions.
//!
//! The exchange rejects a nonce it has already seen for the signer, and
//! several users' orders may be signed in the same millisecond, so nonces
//! come from one process-wide counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

pub struct NonceSource<C: Clock = SystemClock> {
    counter: AtomicU64,
    clock: C,
}

impl<C: Clock> NonceSource<C> {
    pub fn new(clock: C) -> Self {
        Self {
            counter: AtomicU64::new(clock.now_ms()),
            clock,
        }
    }

    /// `max(last + 1, now)`.
    pub fn next(&self) -> u64 {
        let target = self.clock.now_ms();
        loop {
            let current = self.counter.load(Ordering::Acquire);
            let next = current.saturating_add(1).max(target);
            if self
                .counter
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }
}

impl Default for NonceSource<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}
