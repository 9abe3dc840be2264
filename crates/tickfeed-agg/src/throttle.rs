//! Fixed-cadence snapshot publication.
//!
//! Decouples the merge rate from the publish rate: however many ticks land
//! between two firings, consumers see one copy per interval reflecting the
//! latest state (last-value-wins per symbol).

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tickfeed_core::SnapshotTable;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default publication cadence.
pub const DEFAULT_THROTTLE_MS: u64 = 1000;

/// Cancellation handle for a running throttle.
#[derive(Debug, Clone)]
pub struct ThrottleHandle {
    token: CancellationToken,
}

impl ThrottleHandle {
    /// Stop future firings. Safe to call any number of times.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct RenderThrottle;

impl RenderThrottle {
    /// Publish an immutable copy of `table` to `publish` every
    /// `interval_ms` until the returned handle is stopped. The first firing
    /// happens immediately, so seeded state is visible without waiting a
    /// full interval.
    pub fn start<F>(
        table: Arc<RwLock<SnapshotTable>>,
        interval_ms: u64,
        publish: F,
    ) -> ThrottleHandle
    where
        F: Fn(SnapshotTable) + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = task_token.cancelled() => {
                        debug!("Render throttle stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let copy = table.read().clone();
                        publish(copy);
                    }
                }
            }
        });

        ThrottleHandle { token }
    }
}
