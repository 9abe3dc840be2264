//! Symbol and channel-key identifiers.
//!
//! A `Symbol` is the uppercase base asset ("BTC"). A `ChannelKey` is the
//! feed-specific subscription identifier combining symbol, quote currency,
//! and stream type ("btcusdt@ticker").

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Uppercase canonical asset symbol (e.g. "BTC").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Canonicalize a raw symbol (trimmed, uppercased).
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    /// Parse a raw symbol, rejecting empty or whitespace-only input.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Extract the base symbol from a traded pair (e.g. "BTCUSDT" with
    /// quote "USDT" -> "BTC"). Returns `None` when the pair does not end
    /// with the given quote currency.
    pub fn base_of(pair: &str, quote: &str) -> Option<Self> {
        let pair = pair.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();
        let base = pair.strip_suffix(quote.as_str())?;
        if base.is_empty() {
            return None;
        }
        Some(Self(base.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Feed subscription identifier for one stream (e.g. "btcusdt@ticker").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Stream type suffix for 24h ticker channels.
    pub const TICKER_SUFFIX: &'static str = "@ticker";

    /// Build the ticker channel key for a symbol/quote pair.
    pub fn ticker(symbol: &Symbol, quote: &str) -> Self {
        Self(format!(
            "{}{}{}",
            symbol.as_str().to_lowercase(),
            quote.trim().to_lowercase(),
            Self::TICKER_SUFFIX
        ))
    }

    /// Channel key a data frame for `pair` was delivered on (e.g.
    /// "BTCUSDT" -> "btcusdt@ticker"). Used to check incoming ticks
    /// against the committed subscription set.
    pub fn from_pair(pair: &str) -> Self {
        Self(format!(
            "{}{}",
            pair.trim().to_lowercase(),
            Self::TICKER_SUFFIX
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_canonical_form() {
        assert_eq!(Symbol::new(" btc ").as_str(), "BTC");
        assert_eq!(Symbol::new("Eth").as_str(), "ETH");
    }

    #[test]
    fn test_symbol_parse_rejects_empty() {
        assert!(Symbol::parse("").is_err());
        assert!(Symbol::parse("   ").is_err());
        assert!(Symbol::parse("sol").is_ok());
    }

    #[test]
    fn test_symbol_base_of_pair() {
        assert_eq!(Symbol::base_of("BTCUSDT", "USDT"), Some(Symbol::new("BTC")));
        assert_eq!(Symbol::base_of("btcusdt", "usdt"), Some(Symbol::new("BTC")));
        // Pair quoted in something else entirely.
        assert_eq!(Symbol::base_of("BTCEUR", "USDT"), None);
        // Degenerate pair that is nothing but the quote.
        assert_eq!(Symbol::base_of("USDT", "USDT"), None);
    }

    #[test]
    fn test_channel_key_format() {
        let key = ChannelKey::ticker(&Symbol::new("BTC"), "USDT");
        assert_eq!(key.as_str(), "btcusdt@ticker");
    }

    #[test]
    fn test_channel_key_from_pair_matches_ticker() {
        let built = ChannelKey::ticker(&Symbol::new("SOL"), "USDT");
        let resolved = ChannelKey::from_pair("SOLUSDT");
        assert_eq!(built, resolved);
    }
}
