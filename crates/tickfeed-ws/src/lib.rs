//! Streaming connectivity for the live ticker feed.
//!
//! Provides:
//! - Broker-owned connection lifecycle with automatic reconnection
//! - Minimal subscribe/unsubscribe reconciliation of channel sets
//! - Wire-format decode into a tagged frame union
//! - Control-frame rate limiting and idle-stream detection

pub mod connection;
pub mod error;
pub mod rate_limit;
pub mod subscription;
pub mod watchdog;
pub mod wire;

pub use connection::{
    ConnectionBroker, ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionState,
    ReconnectPolicy,
};
pub use error::{WsError, WsResult};
pub use rate_limit::RateLimiter;
pub use subscription::{reconcile, SubscriptionDelta, SubscriptionTracker};
pub use watchdog::IdleWatchdog;
pub use wire::{ControlAck, ControlMethod, ControlRequest, Frame, TickerEvent};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
