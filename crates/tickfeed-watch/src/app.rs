//! Application wiring: seed, aggregate, print.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::seed;
use tickfeed_agg::FeedAggregator;
use tickfeed_core::{SnapshotTable, Symbol};
use tracing::{info, warn};

pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> AppResult<()> {
        let symbols: Vec<Symbol> = self
            .config
            .symbols
            .iter()
            .filter_map(|raw| match Symbol::parse(raw) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid symbol in config");
                    None
                }
            })
            .collect();

        let initial = match &self.config.rest_url {
            Some(rest_url) if !symbols.is_empty() => {
                match seed::fetch_initial_snapshots(
                    rest_url,
                    &symbols,
                    &self.config.quote,
                    self.config.history_length,
                )
                .await
                {
                    Ok(snapshots) => {
                        info!(count = snapshots.len(), "Seeded from REST");
                        snapshots
                    }
                    Err(e) => {
                        warn!(error = %e, "Seeding failed, starting empty");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        info!(
            symbols = ?symbols.iter().map(Symbol::as_str).collect::<Vec<_>>(),
            quote = %self.config.quote,
            url = %self.config.feed_url,
            "Starting feed aggregator"
        );

        let handle = FeedAggregator::spawn(
            initial,
            self.config.symbols.clone(),
            self.config.aggregator_options(),
        );
        let mut snapshots = handle.watch();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        warn!("Aggregator stopped publishing");
                        break;
                    }
                    let table = snapshots.borrow_and_update().clone();
                    print_table(&table);
                }
            }
        }

        handle.shutdown().await?;
        Ok(())
    }
}

fn print_table(table: &SnapshotTable) {
    let mut symbols: Vec<&Symbol> = table.keys().collect();
    symbols.sort();

    for symbol in symbols {
        let snap = &table[symbol];
        if !snap.has_data() {
            continue;
        }
        info!(
            symbol = %snap.symbol,
            price = %snap.price,
            change_percent = %snap.change_percent,
            quote_volume = %snap.quote_volume,
            history = snap.history().len(),
            last_update = %snap.last_update,
            "tick"
        );
    }
}
