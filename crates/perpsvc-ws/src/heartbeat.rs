//! Heartbeat tracking for the upstream connection.
//!
//! Hyperliquid closes idle sockets; we send an application-level
//! `{"method":"ping"}` when nothing has arrived for `interval_ms` and
//! expect `{"channel":"pong"}` within `timeout_ms`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

pub struct HeartbeatManager {
    interval_ms: u64,
    timeout_ms: u64,
    last_ping: RwLock<Option<DateTime<Utc>>>,
    last_message: RwLock<DateTime<Utc>>,
    waiting_for_pong: RwLock<bool>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            last_ping: RwLock::new(None),
            last_message: RwLock::new(Utc::now()),
            waiting_for_pong: RwLock::new(false),
        }
    }

    /// Called on every (re)connect.
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_message.write() = Utc::now();
        *self.waiting_for_pong.write() = false;
    }

    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Utc::now());
        *self.waiting_for_pong.write() = true;
    }

    pub fn record_pong(&self) {
        *self.waiting_for_pong.write() = false;
        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (Utc::now() - ping_time).num_milliseconds();
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Any inbound frame counts as liveness.
    pub fn record_message(&self) {
        *self.last_message.write() = Utc::now();
    }

    pub fn is_waiting_for_pong(&self) -> bool {
        *self.waiting_for_pong.read()
    }

    pub fn is_timed_out(&self) -> bool {
        if !self.is_waiting_for_pong() {
            return false;
        }
        match *self.last_ping.read() {
            Some(ping_time) => (Utc::now() - ping_time).num_milliseconds() > self.timeout_ms as i64,
            None => false,
        }
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - *self.last_message.read()).num_milliseconds()
    }

    pub fn should_send_heartbeat(&self) -> bool {
        !self.is_waiting_for_pong() && self.time_since_last_message_ms() >= self.interval_ms as i64
    }

    /// Sleep until the next check. Checks run at a fraction of the interval
    /// so that a missing pong is noticed close to `timeout_ms`.
    pub async fn wait_for_check(&self) {
        let period = (self.interval_ms / 2).min(self.timeout_ms).max(1);
        tokio::time::sleep(Duration::from_millis(period)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let hb = HeartbeatManager::new(45_000, 10_000);
        assert!(!hb.is_timed_out());
        assert!(!hb.is_waiting_for_pong());
        assert!(!hb.should_send_heartbeat());
    }

    #[test]
    fn test_ping_pong() {
        let hb = HeartbeatManager::new(45_000, 10_000);
        hb.record_ping();
        assert!(hb.is_waiting_for_pong());
        assert!(!hb.should_send_heartbeat());
        hb.record_pong();
        assert!(!hb.is_waiting_for_pong());
    }

    #[test]
    fn test_times_out_without_pong() {
        let hb = HeartbeatManager::new(0, 0);
        assert!(hb.should_send_heartbeat());
        hb.record_ping();
        std::thread::sleep(Duration::from_millis(5));
        assert!(hb.is_timed_out());
    }
}
