//! Tick merging into the keyed snapshot table.
//!
//! The merger is the only component that mutates the table. Everything it
//! hands out is a copy; the render throttle holds the same `Arc` but only
//! ever reads through it.

use chrono::{TimeZone, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use tickfeed_core::{ChannelKey, SnapshotTable, Symbol, TickerSnapshot};
use tickfeed_ws::{Frame, TickerEvent};
use tracing::{debug, warn};

/// Outcome of offering one frame to the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Snapshot table updated.
    Applied,
    /// Control acknowledgment; never market data.
    Ack,
    /// Tick for a channel outside the committed subscription set.
    StaleChannel,
    /// No recognizable symbol, or a shape this client does not consume.
    Unrecognized,
}

pub struct TickMerger {
    table: Arc<RwLock<SnapshotTable>>,
    quote: String,
    history_length: usize,
}

impl TickMerger {
    pub fn new(quote: impl Into<String>, history_length: usize) -> Self {
        Self {
            table: Arc::new(RwLock::new(SnapshotTable::new())),
            quote: quote.into(),
            history_length,
        }
    }

    /// Seed the table with externally supplied snapshots (e.g. from a REST
    /// 24h-stats fetch). Seeds for symbols already present are ignored;
    /// live data always wins over a stale seed.
    pub fn seed(&self, initial: Vec<TickerSnapshot>) {
        let mut table = self.table.write();
        for snapshot in initial {
            table.entry(snapshot.symbol.clone()).or_insert(snapshot);
        }
    }

    /// Shared handle to the table for the publish side. Read-only by
    /// convention: only the merger writes through it.
    pub fn table(&self) -> Arc<RwLock<SnapshotTable>> {
        Arc::clone(&self.table)
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> SnapshotTable {
        self.table.read().clone()
    }

    /// Drop snapshots for symbols no longer desired. Eviction is explicit:
    /// entries leave the table only through this call.
    pub fn evict_unwanted(&self, desired: &BTreeSet<Symbol>) {
        let mut table = self.table.write();
        let before = table.len();
        table.retain(|symbol, _| desired.contains(symbol));
        let removed = before - table.len();
        if removed > 0 {
            debug!(removed, "Evicted snapshots for unsubscribed symbols");
        }
    }

    /// Offer one classified frame. Only ticker events for channels in
    /// `subscribed` reach the table; acknowledgments, unknown shapes, and
    /// stale-channel ticks are discarded without touching it.
    pub fn apply_frame(&self, frame: &Frame, subscribed: &BTreeSet<ChannelKey>) -> MergeOutcome {
        match frame {
            Frame::Ack(_) => MergeOutcome::Ack,
            Frame::Unrecognized => MergeOutcome::Unrecognized,
            Frame::Ticker(event) => self.apply_ticker(event, subscribed),
        }
    }

    fn apply_ticker(&self, event: &TickerEvent, subscribed: &BTreeSet<ChannelKey>) -> MergeOutcome {
        let channel = ChannelKey::from_pair(&event.pair);
        if !subscribed.contains(&channel) {
            // Expected during reconciliation windows: the unsubscribe was
            // sent but upstream had ticks already in flight.
            debug!(channel = %channel, "Discarding tick for unsubscribed channel");
            return MergeOutcome::StaleChannel;
        }

        let Some(symbol) = Symbol::base_of(&event.pair, &self.quote) else {
            warn!(pair = %event.pair, quote = %self.quote, "Tick pair does not match configured quote");
            return MergeOutcome::Unrecognized;
        };

        let at = event
            .event_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let mut table = self.table.write();
        let snapshot = table
            .entry(symbol.clone())
            .or_insert_with(|| TickerSnapshot::new(symbol.clone(), self.history_length));

        match parse_field(&event.last_price, "last_price", &symbol) {
            Some(price) => snapshot.record_price(price, at),
            // Price unusable: keep the previous value and history untouched.
            None => snapshot.last_update = at,
        }
        if let Some(value) = parse_field(&event.change_percent, "change_percent", &symbol) {
            snapshot.change_percent = value;
        }
        if let Some(value) = parse_field(&event.quote_volume, "quote_volume", &symbol) {
            snapshot.quote_volume = value;
        }

        MergeOutcome::Applied
    }
}

/// Parse one text-encoded numeric field. An absent field is silent; a
/// present-but-unparseable field is logged so the retained previous value
/// is visible in the trace.
fn parse_field(raw: &Option<String>, field: &'static str, symbol: &Symbol) -> Option<Decimal> {
    let raw = raw.as_deref()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(%symbol, field, raw, "Unparseable numeric field, keeping previous value");
            None
        }
    }
}
