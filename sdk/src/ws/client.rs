//! WebSocket client implementation.
//!
//! Text frames from the server are handed to [`RelayWsClient::next_broadcast`]
//! unparsed, so a malformed broadcast or a failed stream surfaces to the
//! caller instead of being swallowed by the reader task.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::WsConfig;
use super::error::WsError;
use crate::types::{Broadcast, BusinessMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Items forwarded by the reader task.
type Inbound = Result<String, WsError>;

/// WebSocket client for the relay.
#[derive(Debug)]
pub struct RelayWsClient {
    config: WsConfig,
    sink: Arc<Mutex<Option<WsSink>>>,
    inbound_rx: Mutex<mpsc::Receiver<Inbound>>,
    session: Mutex<CancellationToken>,
}

impl RelayWsClient {
    /// Creates a disconnected client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: WsConfig) -> Result<Self, WsError> {
        config.validate()?;

        // Both are replaced on connect; until then reads report `Closed`.
        let (_, inbound_rx) = mpsc::channel(1);
        let session = CancellationToken::new();
        session.cancel();

        Ok(Self {
            config,
            sink: Arc::new(Mutex::new(None)),
            inbound_rx: Mutex::new(inbound_rx),
            session: Mutex::new(session),
        })
    }

    /// Creates a disconnected client for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a `ws://` or `wss://` URL.
    pub fn with_url(url: impl Into<String>) -> Result<Self, WsError> {
        Self::new(WsConfig::new(url))
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Returns true while the current session's socket is open.
    pub async fn is_connected(&self) -> bool {
        !self.session.lock().await.is_cancelled()
    }

    /// Opens a session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Connection`] if the handshake fails.
    pub async fn connect(&self) -> Result<(), WsError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.config.url.as_str())
            .await
            .map_err(|e| WsError::Connection(e.to_string()))?;

        let (sink, source) = stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.buffer_capacity);
        let session = CancellationToken::new();

        {
            let mut current = self.session.lock().await;
            current.cancel();
            *current = session.clone();
        }
        *self.sink.lock().await = Some(sink);
        *self.inbound_rx.lock().await = inbound_rx;

        tokio::spawn(read_loop(source, inbound_tx, session.clone()));
        tokio::spawn(heartbeat_loop(
            Arc::clone(&self.sink),
            self.config.heartbeat_interval,
            session,
        ));

        debug!(url = %self.config.url, "websocket client connected");
        Ok(())
    }

    /// Publishes a business message as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the send fails.
    pub async fn send(&self, message: &BusinessMessage) -> Result<(), WsError> {
        let json =
            serde_json::to_string(message).map_err(|e| WsError::Serialization(e.to_string()))?;
        self.send_text(json).await
    }

    /// Sends an arbitrary text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the send fails.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(WsError::NotConnected)?;
        sink.send(Message::Text(text.into().into()))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Returns the next broadcast from the server.
    ///
    /// A malformed broadcast is reported without ending the session; the
    /// following call returns the next one.
    ///
    /// # Errors
    ///
    /// - [`WsError::Deserialization`] if the frame is not a broadcast object
    /// - [`WsError::Protocol`] if the stream failed
    /// - [`WsError::Closed`] once the session has ended
    pub async fn next_broadcast(&self) -> Result<Broadcast, WsError> {
        let text = self
            .inbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(WsError::Closed)??;
        serde_json::from_str(&text).map_err(|e| WsError::Deserialization(e.to_string()))
    }

    /// Sends a close frame and ends the session. Closing a client that is
    /// not connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::SendFailed`] if the close frame cannot be written
    /// to a socket that is still open.
    pub async fn close(&self) -> Result<(), WsError> {
        self.session.lock().await.cancel();

        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        match sink.send(Message::Close(None)).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(WsError::SendFailed(e.to_string())),
        }
    }
}

async fn read_loop(
    mut source: WsSource,
    inbound_tx: mpsc::Sender<Inbound>,
    session: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = session.cancelled() => break,
            frame = source.next() => frame,
        };

        let item = match frame {
            Some(Ok(Message::Text(text))) => Ok(text.as_str().to_owned()),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => Err(WsError::from(e)),
        };
        let failed = item.is_err();

        if inbound_tx.send(item).await.is_err() || failed {
            break;
        }
    }

    session.cancel();
    debug!("websocket reader stopped");
}

async fn heartbeat_loop(
    sink: Arc<Mutex<Option<WsSink>>>,
    interval: std::time::Duration,
    session: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            () = session.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut guard = sink.lock().await;
        let Some(sink) = guard.as_mut() else { break };
        if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
            warn!(error = %e, "heartbeat ping failed");
            break;
        }
    }
}
