//! Stream connection management.
//!
//! One background task owns the physical socket. Consumers hold cloneable
//! `ConnectionHandle`s obtained from a `ConnectionBroker`: the first
//! acquisition spawns the connection task, later acquisitions share it, and
//! the task tears down when the last handle is dropped. This keeps exactly
//! one upstream connection per broker regardless of how many consumers
//! attach.

use crate::error::{WsError, WsResult};
use crate::rate_limit::RateLimiter;
use crate::watchdog::IdleWatchdog;
use crate::wire::{ControlRequest, Frame};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reconnection policy after a dropped connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// `Closed` is terminal; the owner must acquire a fresh connection.
    Never,
    /// Reconnect with exponential backoff until shutdown.
    #[default]
    Always,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Idle timeout; a silent stream is cycled after this long.
    pub idle_timeout_ms: u64,
    /// Maximum control frames per rate-limit window.
    pub max_control_messages: u32,
    /// Rate-limit window in seconds.
    pub control_window_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: ReconnectPolicy::Always,
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60_000,
            idle_timeout_ms: 90_000,
            max_control_messages: 5,
            control_window_secs: 1,
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Event surface emitted by the connection task.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Handshake completed; subscriptions must be replayed.
    Opened,
    /// One classified inbound frame.
    Frame(Frame),
    /// The session ended; nothing is subscribed upstream anymore.
    Closed,
}

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Hands out shared handles to at most one live connection.
pub struct ConnectionBroker {
    config: ConnectionConfig,
    live: Mutex<Weak<SharedConnection>>,
}

impl ConnectionBroker {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            live: Mutex::new(Weak::new()),
        }
    }

    /// Return a handle to the live connection, spawning the connection task
    /// if none is running (or if the previous one reached terminal
    /// `Closed`).
    pub fn acquire(&self) -> ConnectionHandle {
        let mut live = self.live.lock();
        if let Some(shared) = live.upgrade() {
            if shared.inner.state() != ConnectionState::Closed {
                return ConnectionHandle { shared };
            }
        }
        let shared = SharedConnection::spawn(self.config.clone());
        *live = Arc::downgrade(&shared);
        ConnectionHandle { shared }
    }
}

struct ConnState {
    state: RwLock<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    outbound_tx: mpsc::Sender<ControlRequest>,
    shutdown: CancellationToken,
    next_id: AtomicU64,
}

impl ConnState {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

struct SharedConnection {
    inner: Arc<ConnState>,
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        debug!("Last connection handle dropped, shutting down");
        self.inner.shutdown.cancel();
    }
}

impl SharedConnection {
    fn spawn(config: ConnectionConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        let inner = Arc::new(ConnState {
            state: RwLock::new(ConnectionState::Connecting),
            events,
            outbound_tx,
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        });

        let task = ConnectionTask {
            watchdog: IdleWatchdog::new(config.idle_timeout_ms),
            limiter: RateLimiter::new(config.max_control_messages, config.control_window_secs),
            inner: inner.clone(),
            outbound_rx,
            config,
        };
        tokio::spawn(task.run());

        Arc::new(Self { inner })
    }
}

/// Cloneable handle to a broker-owned connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<SharedConnection>,
}

impl ConnectionHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribe to the event surface. Events emitted before this call are
    /// not replayed; check `state()` after subscribing to catch an
    /// already-open connection.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.inner.events.subscribe()
    }

    /// Allocate the next control-frame id.
    pub fn next_control_id(&self) -> u64 {
        self.shared.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue a control frame, fire-and-forget. Frames offered while the
    /// connection is not `Open` are dropped and logged, never an error.
    pub fn send(&self, request: ControlRequest) {
        if self.state() != ConnectionState::Open {
            warn!(
                id = request.id,
                method = ?request.method,
                state = ?self.state(),
                "Connection not open, dropping control frame"
            );
            return;
        }
        if self.shared.inner.outbound_tx.try_send(request).is_err() {
            warn!("Outbound queue unavailable, dropping control frame");
        }
    }

    /// Tear the connection down for all holders of this handle.
    pub fn close(&self) {
        let inner = &self.shared.inner;
        if inner.state() != ConnectionState::Closed {
            *inner.state.write() = ConnectionState::Closing;
        }
        inner.shutdown.cancel();
    }

    /// Whether two handles point at the same physical connection.
    pub fn shares_connection_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

struct ConnectionTask {
    config: ConnectionConfig,
    inner: Arc<ConnState>,
    outbound_rx: mpsc::Receiver<ControlRequest>,
    watchdog: IdleWatchdog,
    limiter: RateLimiter,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            if self.inner.shutdown.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting);

            match self.connect_once().await {
                Ok(stream) => {
                    attempt = 0;
                    self.set_state(ConnectionState::Open);
                    self.emit(ConnectionEvent::Opened);

                    let result = self.drive_session(stream).await;
                    self.emit(ConnectionEvent::Closed);

                    match result {
                        Ok(()) => info!("WebSocket session ended"),
                        Err(e) => error!(error = %e, "WebSocket session error"),
                    }
                }
                Err(e) => {
                    error!(error = %e, url = %self.config.url, "WebSocket connect failed");
                }
            }

            if self.inner.shutdown.is_cancelled() {
                break;
            }
            if self.config.reconnect == ReconnectPolicy::Never {
                info!("Reconnect disabled, connection is terminal");
                break;
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                break;
            }

            let delay = backoff_delay(&self.config, attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.inner.shutdown.cancelled() => break,
            }
        }

        self.set_state(ConnectionState::Closed);
        debug!("Connection task exited");
    }

    async fn connect_once(&self) -> WsResult<WsStream> {
        info!(url = %self.config.url, "Connecting to WebSocket");
        // TCP_NODELAY for lower tick latency.
        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        info!("WebSocket connected");
        Ok(ws_stream)
    }

    async fn drive_session(&mut self, stream: WsStream) -> WsResult<()> {
        let (mut write, mut read) = stream.split();

        // Control frames queued against a previous session must not replay
        // into this one; consumers resubscribe from scratch on Opened.
        while let Ok(stale) = self.outbound_rx.try_recv() {
            debug!(id = stale.id, "Dropping control frame from previous session");
        }

        self.watchdog.reset();

        loop {
            tokio::select! {
                // Queued control frames drain before shutdown is honored:
                // teardown's final unsubscribe must reach the wire before
                // the Close frame.
                biased;

                request = self.outbound_rx.recv() => {
                    if let Some(request) = request {
                        self.limiter.wait_for_capacity().await;
                        let payload = serde_json::to_string(&request)?;
                        write.send(Message::Text(payload)).await?;
                        self.limiter.record_send();
                        debug!(id = request.id, method = ?request.method, "Control frame sent");
                    }
                }

                () = self.inner.shutdown.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            self.watchdog.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.watchdog.record_message();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                () = self.watchdog.wait_for_check() => {
                    if self.watchdog.is_stale() {
                        error!(
                            idle_ms = self.watchdog.idle_for().as_millis(),
                            "Idle timeout, cycling connection"
                        );
                        return Err(WsError::IdleTimeout {
                            idle_ms: self.watchdog.idle_timeout_ms(),
                        });
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        self.watchdog.record_message();

        // A single malformed frame never terminates the stream.
        match Frame::decode(text) {
            Ok(frame) => {
                if let Frame::Ack(ack) = &frame {
                    debug!(id = ?ack.id, result = ?ack.result, "Control acknowledgment");
                }
                self.emit(ConnectionEvent::Frame(frame));
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed frame");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.write() = state;
    }

    fn emit(&self, event: ConnectionEvent) {
        // Send fails only when no receiver is subscribed.
        let _ = self.inner.events.send(event);
    }
}

/// Exponential backoff with jitter: base * 2^(attempt-1), capped.
fn backoff_delay(config: &ConnectionConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = config
        .reconnect_base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(config.reconnect_max_delay_ms);
    Duration::from_millis(delay + rand_jitter())
}

/// Random jitter (0-1000ms).
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}
