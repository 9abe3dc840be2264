//! Subscription set reconciliation.
//!
//! `reconcile` computes the minimal subscribe/unsubscribe delta between the
//! set committed on the wire and a newly desired set. `SubscriptionTracker`
//! records both sets; the caller sends the UNSUBSCRIBE frame first, then
//! SUBSCRIBE, then commits, so old and new channels are never live at once.

use std::collections::BTreeSet;
use tickfeed_core::ChannelKey;

/// Delta taking one channel set to another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    pub to_subscribe: Vec<ChannelKey>,
    pub to_unsubscribe: Vec<ChannelKey>,
}

impl SubscriptionDelta {
    pub fn is_empty(&self) -> bool {
        self.to_subscribe.is_empty() && self.to_unsubscribe.is_empty()
    }
}

/// Compute the minimal delta taking `current` to `desired`.
///
/// Pure function: channels in both sets appear in neither list, so an
/// unchanged symbol is never resubscribed.
pub fn reconcile(
    current: &BTreeSet<ChannelKey>,
    desired: &BTreeSet<ChannelKey>,
) -> SubscriptionDelta {
    SubscriptionDelta {
        to_subscribe: desired.difference(current).cloned().collect(),
        to_unsubscribe: current.difference(desired).cloned().collect(),
    }
}

/// Tracks the desired channel set and the set committed on the wire.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    desired: BTreeSet<ChannelKey>,
    committed: BTreeSet<ChannelKey>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new desired set and return the delta against the committed
    /// set. The desired set is always recorded, even when the connection is
    /// down and no control frames can be sent.
    pub fn set_desired(&mut self, desired: BTreeSet<ChannelKey>) -> SubscriptionDelta {
        self.desired = desired;
        reconcile(&self.committed, &self.desired)
    }

    /// Commit the desired set as live on the wire. Call after the control
    /// frames for the latest delta have been handed to the connection.
    pub fn commit(&mut self) {
        self.committed = self.desired.clone();
    }

    /// Forget the committed set (the connection dropped; nothing is live).
    pub fn invalidate(&mut self) {
        self.committed.clear();
    }

    /// Delta that subscribes the full desired set from scratch. Used after
    /// a reopen, when the upstream has forgotten all prior subscriptions.
    pub fn resubscribe_all(&mut self) -> SubscriptionDelta {
        self.invalidate();
        reconcile(&self.committed, &self.desired)
    }

    /// Whether a channel is currently committed.
    pub fn is_subscribed(&self, key: &ChannelKey) -> bool {
        self.committed.contains(key)
    }

    pub fn committed(&self) -> &BTreeSet<ChannelKey> {
        &self.committed
    }

    pub fn desired(&self) -> &BTreeSet<ChannelKey> {
        &self.desired
    }
}
