//! Live market feed aggregation.
//!
//! Merges ticker streams into a keyed snapshot table and publishes
//! immutable copies on a fixed cadence, decoupled from tick arrival rate.
//! `FeedAggregator::spawn` is the boundary an embedding layer consumes.

pub mod aggregator;
pub mod error;
pub mod merger;
pub mod throttle;

pub use aggregator::{AggregatorHandle, AggregatorOptions, FeedAggregator};
pub use error::{AggError, AggResult};
pub use merger::{MergeOutcome, TickMerger};
pub use throttle::{RenderThrottle, ThrottleHandle, DEFAULT_THROTTLE_MS};
