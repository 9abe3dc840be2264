//! Idle-connection watchdog.
//!
//! The ticker feed pushes data continuously while any channel is
//! subscribed, so a stream that goes silent past the idle timeout is
//! treated as dead and the session is cycled through the reconnect path.

use parking_lot::RwLock;
use std::time::{Duration, Instant};

pub struct IdleWatchdog {
    idle_timeout: Duration,
    last_message: RwLock<Instant>,
}

impl IdleWatchdog {
    pub fn new(idle_timeout_ms: u64) -> Self {
        Self {
            idle_timeout: Duration::from_millis(idle_timeout_ms.max(1)),
            last_message: RwLock::new(Instant::now()),
        }
    }

    /// Reset the activity clock (called when a session opens).
    pub fn reset(&self) {
        *self.last_message.write() = Instant::now();
    }

    /// Record inbound activity of any kind.
    pub fn record_message(&self) {
        *self.last_message.write() = Instant::now();
    }

    /// Time since the last inbound message.
    pub fn idle_for(&self) -> Duration {
        self.last_message.read().elapsed()
    }

    /// Whether the stream has been silent past the timeout.
    pub fn is_stale(&self) -> bool {
        self.idle_for() >= self.idle_timeout
    }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout.as_millis() as u64
    }

    /// Sleep until the next staleness check is due.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(self.idle_timeout / 2).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_watchdog_not_stale() {
        let watchdog = IdleWatchdog::new(60_000);
        assert!(!watchdog.is_stale());
    }

    #[test]
    fn test_stale_after_silence() {
        let watchdog = IdleWatchdog::new(1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(watchdog.is_stale());
    }

    #[test]
    fn test_activity_resets_staleness() {
        let watchdog = IdleWatchdog::new(50);
        std::thread::sleep(Duration::from_millis(10));
        watchdog.record_message();
        assert!(!watchdog.is_stale());
    }
}
