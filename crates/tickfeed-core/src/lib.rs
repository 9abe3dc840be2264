//! Core domain types for the live ticker feed aggregator.
//!
//! This crate provides the fundamental types shared by all crates:
//! - `Symbol`: uppercase canonical asset identifier
//! - `ChannelKey`: feed subscription identifier ("btcusdt@ticker")
//! - `TickerSnapshot`: per-symbol market state with bounded price history
//! - `SnapshotTable`: the keyed snapshot map published to consumers

pub mod error;
pub mod snapshot;
pub mod symbol;

pub use error::{CoreError, CoreResult};
pub use snapshot::{SnapshotTable, TickerSnapshot, DEFAULT_HISTORY_LENGTH, DEFAULT_QUOTE};
pub use symbol::{ChannelKey, Symbol};
