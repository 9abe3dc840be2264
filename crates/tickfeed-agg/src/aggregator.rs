//! Aggregator facade.
//!
//! Ties the connection, subscription reconciliation, tick merging, and
//! throttled publication together behind one handle. A single event loop
//! task serializes connection events and symbol-set changes, so a set
//! change always reconciles fully before any later-arriving tick is
//! evaluated against it.

use crate::error::{AggError, AggResult};
use crate::merger::TickMerger;
use crate::throttle::{RenderThrottle, ThrottleHandle, DEFAULT_THROTTLE_MS};
use std::collections::BTreeSet;
use tickfeed_core::{
    ChannelKey, SnapshotTable, Symbol, TickerSnapshot, DEFAULT_HISTORY_LENGTH, DEFAULT_QUOTE,
};
use tickfeed_ws::{
    ConnectionBroker, ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionState,
    ControlRequest, SubscriptionTracker,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Aggregator options.
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Quote currency appended to symbols when forming channel keys.
    pub quote: String,
    /// Bound for per-symbol price history.
    pub history_length: usize,
    /// Publication cadence.
    pub throttle_ms: u64,
    /// Connection settings (URL, reconnect policy, timeouts).
    pub connection: ConnectionConfig,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            quote: DEFAULT_QUOTE.to_string(),
            history_length: DEFAULT_HISTORY_LENGTH,
            throttle_ms: DEFAULT_THROTTLE_MS,
            connection: ConnectionConfig::default(),
        }
    }
}

enum Command {
    SetSymbols(Vec<String>),
    Shutdown,
}

pub struct FeedAggregator;

impl FeedAggregator {
    /// Spawn an aggregator. `initial` seeds the snapshot table; `symbols`
    /// is the initial desired set. An empty desired set is legal: the
    /// aggregator stays idle and opens no connection until symbols arrive.
    pub fn spawn(
        initial: Vec<TickerSnapshot>,
        symbols: Vec<String>,
        options: AggregatorOptions,
    ) -> AggregatorHandle {
        let (snapshot_tx, snapshot_rx) = watch::channel(SnapshotTable::new());
        let (command_tx, command_rx) = mpsc::channel(16);

        let merger = TickMerger::new(options.quote.clone(), options.history_length);
        merger.seed(initial);

        let task = AggregatorTask {
            broker: ConnectionBroker::new(options.connection.clone()),
            options,
            merger,
            tracker: SubscriptionTracker::new(),
            connection: None,
            events: None,
            snapshot_tx,
            command_rx,
        };
        let join = tokio::spawn(task.run(symbols));

        AggregatorHandle {
            snapshots: snapshot_rx,
            commands: command_tx,
            join,
        }
    }
}

/// Handle to a running aggregator: the latest published table, the desired
/// symbol set, and teardown.
pub struct AggregatorHandle {
    snapshots: watch::Receiver<SnapshotTable>,
    commands: mpsc::Sender<Command>,
    join: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Copy of the most recently published snapshot table.
    pub fn latest(&self) -> SnapshotTable {
        self.snapshots.borrow().clone()
    }

    /// Receiver observing every publication.
    pub fn watch(&self) -> watch::Receiver<SnapshotTable> {
        self.snapshots.clone()
    }

    /// Replace the desired symbol set.
    pub async fn set_symbols(&self, symbols: Vec<String>) -> AggResult<()> {
        self.commands
            .send(Command::SetSymbols(symbols))
            .await
            .map_err(|_| AggError::Terminated)
    }

    /// Ordered teardown: render throttle first, then unsubscribe-all while
    /// the connection is still open, then connection close.
    pub async fn shutdown(self) -> AggResult<()> {
        let _ = self.commands.send(Command::Shutdown).await;
        self.join.await.map_err(|_| AggError::Terminated)
    }
}

struct AggregatorTask {
    options: AggregatorOptions,
    broker: ConnectionBroker,
    merger: TickMerger,
    tracker: SubscriptionTracker,
    connection: Option<ConnectionHandle>,
    events: Option<broadcast::Receiver<ConnectionEvent>>,
    snapshot_tx: watch::Sender<SnapshotTable>,
    command_rx: mpsc::Receiver<Command>,
}

enum EventPoll {
    Event(ConnectionEvent),
    Lagged,
    Gone,
}

impl AggregatorTask {
    async fn run(mut self, initial_symbols: Vec<String>) {
        let throttle = self.start_throttle();

        self.apply_symbols(initial_symbols);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(Command::SetSymbols(symbols)) => self.apply_symbols(symbols),
                        Some(Command::Shutdown) | None => break,
                    }
                }
                poll = Self::next_event(&mut self.events) => {
                    match poll {
                        EventPoll::Event(ConnectionEvent::Opened) => self.resubscribe_all(),
                        EventPoll::Event(ConnectionEvent::Frame(frame)) => {
                            self.merger.apply_frame(&frame, self.tracker.committed());
                        }
                        EventPoll::Event(ConnectionEvent::Closed) => {
                            // Upstream forgot everything; replay on reopen.
                            self.tracker.invalidate();
                        }
                        EventPoll::Lagged => {}
                        EventPoll::Gone => {
                            self.events = None;
                            self.tracker.invalidate();
                        }
                    }
                }
            }
        }

        self.teardown(throttle);
    }

    fn start_throttle(&self) -> ThrottleHandle {
        let snapshot_tx = self.snapshot_tx.clone();
        RenderThrottle::start(
            self.merger.table(),
            self.options.throttle_ms,
            move |table| {
                let _ = snapshot_tx.send(table);
            },
        )
    }

    /// Await the next connection event; pends forever while no connection
    /// exists so the select loop only wakes on commands.
    async fn next_event(events: &mut Option<broadcast::Receiver<ConnectionEvent>>) -> EventPoll {
        match events {
            Some(rx) => match rx.recv().await {
                Ok(event) => EventPoll::Event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event receiver lagged, ticks dropped");
                    EventPoll::Lagged
                }
                Err(broadcast::error::RecvError::Closed) => EventPoll::Gone,
            },
            None => std::future::pending().await,
        }
    }

    fn apply_symbols(&mut self, raw: Vec<String>) {
        let mut desired_symbols = BTreeSet::new();
        for raw_symbol in raw {
            match Symbol::parse(&raw_symbol) {
                Ok(symbol) => {
                    desired_symbols.insert(symbol);
                }
                Err(e) => warn!(error = %e, "Skipping invalid symbol"),
            }
        }

        // Evict before anything else: a tick arriving after this point must
        // never resurrect a dropped symbol.
        self.merger.evict_unwanted(&desired_symbols);

        let desired_keys: BTreeSet<ChannelKey> = desired_symbols
            .iter()
            .map(|symbol| ChannelKey::ticker(symbol, &self.options.quote))
            .collect();
        let delta = self.tracker.set_desired(desired_keys);

        // A terminally-closed connection counts as absent: the next
        // non-empty desired set re-opens through the broker.
        let has_live_connection = self
            .connection
            .as_ref()
            .is_some_and(|c| c.state() != ConnectionState::Closed);

        if !has_live_connection {
            if desired_symbols.is_empty() {
                // Legal but idle: no connection until symbols arrive.
                return;
            }
            self.connect();
            // Reconciliation happens via resubscribe once the connection
            // reports Opened.
            return;
        }

        let Some(connection) = &self.connection else {
            return;
        };
        if !connection.is_open() {
            debug!("Connection not open, desired set recorded for replay");
            return;
        }
        if delta.is_empty() {
            return;
        }

        // Unsubscribe first so old and new channels are never live at once.
        if !delta.to_unsubscribe.is_empty() {
            connection.send(ControlRequest::unsubscribe(
                &delta.to_unsubscribe,
                connection.next_control_id(),
            ));
        }
        if !delta.to_subscribe.is_empty() {
            connection.send(ControlRequest::subscribe(
                &delta.to_subscribe,
                connection.next_control_id(),
            ));
        }
        self.tracker.commit();

        debug!(
            subscribed = delta.to_subscribe.len(),
            unsubscribed = delta.to_unsubscribe.len(),
            "Subscription set reconciled"
        );
    }

    fn connect(&mut self) {
        let connection = self.broker.acquire();
        let events = connection.events();
        let already_open = connection.is_open();

        self.connection = Some(connection);
        self.events = Some(events);
        info!(url = %self.options.connection.url, "Feed connection acquired");

        // The Opened event may have fired before we subscribed to the event
        // surface; catch up from the state snapshot.
        if already_open {
            self.resubscribe_all();
        }
    }

    fn resubscribe_all(&mut self) {
        let delta = self.tracker.resubscribe_all();
        if delta.to_subscribe.is_empty() {
            return;
        }
        let Some(connection) = &self.connection else {
            return;
        };
        connection.send(ControlRequest::subscribe(
            &delta.to_subscribe,
            connection.next_control_id(),
        ));
        self.tracker.commit();
        info!(
            channels = delta.to_subscribe.len(),
            "Subscriptions replayed"
        );
    }

    fn teardown(mut self, throttle: ThrottleHandle) {
        // Order matters: stop publication, then unsubscribe while still
        // open, then close the socket.
        throttle.stop();

        if let Some(connection) = self.connection.take() {
            if connection.is_open() && !self.tracker.committed().is_empty() {
                let channels: Vec<ChannelKey> = self.tracker.committed().iter().cloned().collect();
                connection.send(ControlRequest::unsubscribe(
                    &channels,
                    connection.next_control_id(),
                ));
            }
            connection.close();
        }

        info!("Aggregator stopped");
    }
}
