//! Transport-agnostic duplex connection engine.
//!
//! A [`Connection`] owns two bounded queues and two pump tasks. The reader
//! pump pulls decoded payloads from a [`MessageSource`] into the inbound
//! queue; the writer pump drains the outbound queue into a [`MessageSink`]
//! and emits keepalives. Both transports plug in through those two traits.
//!
//! The idle deadline runs from the last inbound item or delivered payload,
//! so a peer that only listens stays connected while broadcasts reach it.
//! Keepalives alone never extend it.
//!
//! Closing is idempotent: whichever of the pumps or an outside caller gets
//! there first fires the shutdown token and removes the connection from its
//! registry; every later call is a no-op.

pub mod tcp;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cmdrelay_sdk::{CodecError, Protocol};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::ConnectionRegistry;

/// Generates a unique connection ID.
#[must_use]
pub fn next_connection_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Per-connection engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Capacity of the inbound and outbound queues.
    pub queue_capacity: usize,

    /// Longest silence tolerated from the peer.
    pub idle_timeout: Duration,

    /// Deadline for each transport write.
    pub write_timeout: Duration,

    /// Period between keepalives.
    pub keepalive_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            idle_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(54),
        }
    }
}

/// Transport-level failures. Each one closes the affected connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame codec failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// WebSocket stream failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// Operation exceeded its deadline.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

/// Returned by [`Connection`] operations once the connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

/// One item read from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Application payload.
    Message(Bytes),
    /// Keepalive or pong; proves the peer is alive.
    Heartbeat,
}

/// Read half of a transport.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Returns the next item, or `None` once the peer has closed cleanly.
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError>;
}

/// Write half of a transport.
#[async_trait]
pub trait MessageSink: Send + 'static {
    /// Writes one payload.
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Writes a keepalive.
    async fn keepalive(&mut self) -> Result<(), TransportError>;

    /// Flushes and releases the write half.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// A live peer connection.
#[derive(Debug)]
pub struct Connection {
    id: String,
    kind: Protocol,
    remote_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    settings: ConnectionSettings,
    inbound: AsyncMutex<mpsc::Receiver<Bytes>>,
    outbound: mpsc::Sender<Bytes>,
    closed: Mutex<bool>,
    last_activity: Mutex<Instant>,
    shutdown: CancellationToken,
    registry: Weak<ConnectionRegistry>,
}

impl Connection {
    /// Wraps a transport and starts its reader and writer pumps.
    ///
    /// The connection is not registered; closing it removes it from
    /// `registry` if it was.
    pub fn spawn<S, K>(
        kind: Protocol,
        remote_addr: SocketAddr,
        source: S,
        sink: K,
        settings: ConnectionSettings,
        registry: &Arc<ConnectionRegistry>,
    ) -> Arc<Self>
    where
        S: MessageSource,
        K: MessageSink,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel(settings.queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(settings.queue_capacity);

        let connection = Arc::new(Self {
            id: next_connection_id(),
            kind,
            remote_addr,
            connected_at: Utc::now(),
            settings,
            inbound: AsyncMutex::new(inbound_rx),
            outbound: outbound_tx,
            closed: Mutex::new(false),
            last_activity: Mutex::new(Instant::now()),
            shutdown: CancellationToken::new(),
            registry: Arc::downgrade(registry),
        });

        tokio::spawn(read_pump(Arc::clone(&connection), source, inbound_tx));
        tokio::spawn(write_pump(Arc::clone(&connection), sink, outbound_rx));

        debug!(
            conn_id = %connection.id,
            remote_addr = %remote_addr,
            protocol = %kind,
            "connection opened"
        );

        connection
    }

    /// Returns the connection ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the protocol this connection is served under.
    #[must_use]
    pub const fn kind(&self) -> Protocol {
        self.kind
    }

    /// Returns the peer address.
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns when the connection was accepted.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Waits for the next payload from the peer.
    ///
    /// Payloads already queued when the connection closes are still
    /// returned before [`ConnectionError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] once the connection is closed and
    /// the inbound queue is drained.
    pub async fn read_message(&self) -> Result<Bytes, ConnectionError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            payload = inbound.recv() => payload.ok_or(ConnectionError::Closed),
            () = self.shutdown.cancelled() => Err(ConnectionError::Closed),
        }
    }

    /// Queues a payload for the peer, waiting while the outbound queue is
    /// full.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the connection is or becomes
    /// closed before the payload is queued.
    pub async fn write_message(&self, payload: Bytes) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(ConnectionError::Closed),
            sent = self.outbound.send(payload) => sent.map_err(|_| ConnectionError::Closed),
        }
    }

    /// Closes the connection.
    ///
    /// Returns true only for the call that performed the close.
    pub fn close(&self) -> bool {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return false;
            }
            *closed = true;
        }

        self.shutdown.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.id);
        }

        debug!(
            conn_id = %self.id,
            remote_addr = %self.remote_addr,
            protocol = %self.kind,
            "connection closed"
        );
        true
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_deadline(&self) -> Instant {
        *self.last_activity.lock() + self.settings.idle_timeout
    }
}

async fn read_pump<S: MessageSource>(
    connection: Arc<Connection>,
    mut source: S,
    inbound_tx: mpsc::Sender<Bytes>,
) {
    let idle_timeout = connection.settings.idle_timeout;

    loop {
        let deadline = connection.idle_deadline();
        let next = tokio::select! {
            biased;
            () = connection.shutdown.cancelled() => break,
            next = tokio::time::timeout_at(deadline, source.recv()) => next,
        };

        if next.is_ok() {
            connection.touch();
        }

        match next {
            Ok(Ok(Some(Inbound::Message(payload)))) => {
                tokio::select! {
                    biased;
                    () = connection.shutdown.cancelled() => break,
                    queued = inbound_tx.send(payload) => {
                        if queued.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(Ok(Some(Inbound::Heartbeat))) => {}
            Ok(Ok(None)) => {
                debug!(conn_id = %connection.id, "peer closed the connection");
                break;
            }
            Ok(Err(e)) => {
                debug!(conn_id = %connection.id, error = %e, "read failed");
                break;
            }
            Err(_) if connection.idle_deadline() > Instant::now() => {}
            Err(_) => {
                debug!(
                    conn_id = %connection.id,
                    timeout = ?idle_timeout,
                    "idle timeout"
                );
                break;
            }
        }
    }

    connection.close();
}

async fn write_pump<K: MessageSink>(
    connection: Arc<Connection>,
    mut sink: K,
    mut outbound_rx: mpsc::Receiver<Bytes>,
) {
    let settings = connection.settings;
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + settings.keepalive_interval,
        settings.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let written = tokio::select! {
            biased;
            () = connection.shutdown.cancelled() => break,
            payload = outbound_rx.recv() => match payload {
                Some(payload) => {
                    let sent = with_deadline("write", settings.write_timeout, sink.send(payload)).await;
                    if sent.is_ok() {
                        connection.touch();
                    }
                    sent
                }
                None => break,
            },
            _ = keepalive.tick() => {
                with_deadline("keepalive", settings.write_timeout, sink.keepalive()).await
            }
        };

        if let Err(e) = written {
            debug!(conn_id = %connection.id, error = %e, "write failed");
            break;
        }
    }

    connection.close();

    if let Err(e) = with_deadline("close", settings.write_timeout, sink.close()).await {
        debug!(conn_id = %connection.id, error = %e, "transport close failed");
    }
}

async fn with_deadline<F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TransportError::Timeout(operation, limit))?
}
