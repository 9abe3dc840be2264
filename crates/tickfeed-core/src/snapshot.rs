//! Per-symbol ticker snapshots with bounded price history.

use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default bound for the per-symbol rolling price history.
pub const DEFAULT_HISTORY_LENGTH: usize = 20;

/// Default quote currency for channel keys.
pub const DEFAULT_QUOTE: &str = "USDT";

/// Latest merged market state for one symbol.
///
/// `history` keeps the most recent prices in chronological order,
/// oldest first; the oldest entry is evicted once the bound is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub symbol: Symbol,
    pub price: Decimal,
    pub change_percent: Decimal,
    pub quote_volume: Decimal,
    pub last_update: DateTime<Utc>,
    history: VecDeque<Decimal>,
    history_length: usize,
}

impl TickerSnapshot {
    /// Create an empty snapshot; values are filled by the first tick.
    pub fn new(symbol: Symbol, history_length: usize) -> Self {
        let history_length = history_length.max(1);
        Self {
            symbol,
            price: Decimal::ZERO,
            change_percent: Decimal::ZERO,
            quote_volume: Decimal::ZERO,
            last_update: Utc::now(),
            history: VecDeque::with_capacity(history_length),
            history_length,
        }
    }

    /// Create a snapshot pre-populated from externally supplied data
    /// (e.g. a REST 24h-stats response).
    pub fn seeded(
        symbol: Symbol,
        price: Decimal,
        change_percent: Decimal,
        quote_volume: Decimal,
        history_length: usize,
    ) -> Self {
        let mut snapshot = Self::new(symbol, history_length);
        snapshot.change_percent = change_percent;
        snapshot.quote_volume = quote_volume;
        snapshot.record_price(price, Utc::now());
        snapshot
    }

    /// Record a new traded price: updates `price` and `last_update` and
    /// appends to the rolling history, evicting the oldest entry when the
    /// bound is exceeded.
    pub fn record_price(&mut self, price: Decimal, at: DateTime<Utc>) {
        self.price = price;
        self.last_update = at;
        self.history.push_back(price);
        while self.history.len() > self.history_length {
            self.history.pop_front();
        }
    }

    /// Rolling price history, oldest first.
    pub fn history(&self) -> &VecDeque<Decimal> {
        &self.history
    }

    /// Configured history bound.
    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Whether any tick has been recorded yet.
    pub fn has_data(&self) -> bool {
        !self.history.is_empty()
    }
}

/// Keyed snapshot map. Exclusively mutated by the tick merger; every
/// other component receives copies.
pub type SnapshotTable = HashMap<Symbol, TickerSnapshot>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_history_bounded_and_chronological() {
        let mut snap = TickerSnapshot::new(Symbol::new("BTC"), 3);

        for price in [dec!(50000), dec!(50500), dec!(51000), dec!(51500)] {
            snap.record_price(price, Utc::now());
        }

        assert_eq!(snap.price, dec!(51500));
        assert_eq!(snap.history().len(), 3);
        let prices: Vec<_> = snap.history().iter().copied().collect();
        assert_eq!(prices, vec![dec!(50500), dec!(51000), dec!(51500)]);
    }

    #[test]
    fn test_history_stays_within_bound_under_load() {
        let mut snap = TickerSnapshot::new(Symbol::new("ETH"), 20);

        for i in 0..200 {
            snap.record_price(Decimal::from(i), Utc::now());
        }

        assert_eq!(snap.history().len(), 20);
        assert_eq!(snap.history().front().copied(), Some(Decimal::from(180)));
        assert_eq!(snap.history().back().copied(), Some(Decimal::from(199)));
    }

    #[test]
    fn test_zero_history_length_clamped() {
        let mut snap = TickerSnapshot::new(Symbol::new("SOL"), 0);
        snap.record_price(dec!(150), Utc::now());
        assert_eq!(snap.history().len(), 1);
    }

    #[test]
    fn test_seeded_snapshot() {
        let snap = TickerSnapshot::seeded(
            Symbol::new("BTC"),
            dec!(50000),
            dec!(2.5),
            dec!(1000000),
            20,
        );

        assert!(snap.has_data());
        assert_eq!(snap.price, dec!(50000));
        assert_eq!(snap.change_percent, dec!(2.5));
        assert_eq!(snap.history().len(), 1);
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let snap = TickerSnapshot::seeded(Symbol::new("BTC"), dec!(42000.5), dec!(-1.2), dec!(99), 5);
        let json = serde_json::to_string(&snap).unwrap();
        let back: TickerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.symbol, snap.symbol);
        assert_eq!(back.price, snap.price);
        assert_eq!(back.history().len(), 1);
    }
}
