//! Sliding-window rate limiting for outbound control frames.
//!
//! The upstream feed caps inbound control messages per connection; the
//! connection task waits for capacity before writing a frame rather than
//! surfacing an error to the caller.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

pub struct RateLimiter {
    max_messages: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Allow at most `max_messages` sends per `window_secs` window.
    pub fn new(max_messages: u32, window_secs: u64) -> Self {
        Self {
            max_messages: max_messages.max(1),
            window: Duration::from_secs(window_secs.max(1)),
            timestamps: Mutex::new(VecDeque::with_capacity(max_messages as usize)),
        }
    }

    /// Whether a send would stay within the window.
    pub fn can_send(&self) -> bool {
        self.cleanup_old_timestamps();
        self.timestamps.lock().len() < self.max_messages as usize
    }

    /// Record a send.
    pub fn record_send(&self) {
        self.cleanup_old_timestamps();

        let mut timestamps = self.timestamps.lock();
        timestamps.push_back(Instant::now());

        if timestamps.len() >= self.max_messages as usize {
            warn!(
                count = timestamps.len(),
                max = self.max_messages,
                "Control-frame rate limit reached"
            );
        }
    }

    /// Sends recorded inside the current window.
    pub fn current_count(&self) -> u32 {
        self.cleanup_old_timestamps();
        self.timestamps.lock().len() as u32
    }

    /// Sends still allowed inside the current window.
    pub fn remaining_capacity(&self) -> u32 {
        self.max_messages.saturating_sub(self.current_count())
    }

    /// Wait until a send would stay within the window.
    pub async fn wait_for_capacity(&self) {
        while !self.can_send() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn cleanup_old_timestamps(&self) {
        let cutoff = Instant::now() - self.window;
        let mut timestamps = self.timestamps.lock();
        while timestamps.front().is_some_and(|&t| t < cutoff) {
            timestamps.pop_front();
        }
    }
}
