//! Initial snapshot seeding over REST.
//!
//! Fetches 24h ticker statistics so the table starts populated instead of
//! waiting for the first live tick per symbol. Seeding is best-effort: any
//! failure here degrades to an empty seed, never a startup error.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tickfeed_core::{Symbol, TickerSnapshot};
use tracing::{debug, warn};

/// One entry of the 24h ticker statistics response.
#[derive(Debug, Deserialize)]
struct Rest24hTicker {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
    #[serde(rename = "quoteVolume")]
    quote_volume: String,
}

/// Fetch seed snapshots for `symbols`. Symbols missing from the response
/// or carrying unparseable numbers are skipped with a warning.
pub async fn fetch_initial_snapshots(
    rest_url: &str,
    symbols: &[Symbol],
    quote: &str,
    history_length: usize,
) -> anyhow::Result<Vec<TickerSnapshot>> {
    let pairs: Vec<String> = symbols
        .iter()
        .map(|s| format!("\"{}{}\"", s.as_str(), quote.to_uppercase()))
        .collect();
    let url = format!(
        "{}/api/v3/ticker/24hr?symbols=[{}]",
        rest_url.trim_end_matches('/'),
        pairs.join(",")
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    debug!(%url, "Fetching 24h ticker statistics");
    let stats: Vec<Rest24hTicker> = client.get(&url).send().await?.error_for_status()?.json().await?;

    let mut snapshots = Vec::with_capacity(stats.len());
    for stat in stats {
        let Some(symbol) = Symbol::base_of(&stat.symbol, quote) else {
            warn!(pair = %stat.symbol, "Seed pair does not match configured quote, skipping");
            continue;
        };

        let parsed: Option<(Decimal, Decimal, Decimal)> = (|| {
            Some((
                stat.last_price.parse().ok()?,
                stat.price_change_percent.parse().ok()?,
                stat.quote_volume.parse().ok()?,
            ))
        })();

        match parsed {
            Some((price, change_percent, quote_volume)) => {
                snapshots.push(TickerSnapshot::seeded(
                    symbol,
                    price,
                    change_percent,
                    quote_volume,
                    history_length,
                ));
            }
            None => warn!(pair = %stat.symbol, "Unparseable seed entry, skipping"),
        }
    }

    debug!(count = snapshots.len(), "Seed snapshots fetched");
    Ok(snapshots)
}
