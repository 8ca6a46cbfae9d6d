//! TCP client implementation.
//!
//! Provides the framed TCP client for publishing business messages and
//! receiving broadcasts.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use super::config::TcpConfig;
use crate::codec::FrameCodec;
use crate::error::{ClientError, CodecError};
use crate::types::{Broadcast, BusinessMessage};

type FrameSink = FramedWrite<OwnedWriteHalf, FrameCodec>;
type FrameSource = FramedRead<OwnedReadHalf, FrameCodec>;

/// Framed TCP client for the relay.
#[derive(Debug)]
pub struct RelayTcpClient {
    config: TcpConfig,
    sink: Arc<Mutex<FrameSink>>,
    payload_rx: Mutex<mpsc::Receiver<Bytes>>,
    reader: JoinHandle<()>,
}

impl RelayTcpClient {
    /// Connects to the relay's TCP listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the connection
    /// cannot be established within the connect timeout.
    pub async fn connect(config: TcpConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let (read_half, write_half) = stream.into_split();
        let sink = Arc::new(Mutex::new(FramedWrite::new(
            write_half,
            FrameCodec::new(config.max_message_size),
        )));
        let source = FramedRead::new(read_half, FrameCodec::new(config.max_message_size));

        let (payload_tx, payload_rx) = mpsc::channel(config.buffer_capacity);
        let reader = tokio::spawn(read_loop(source, Arc::clone(&sink), payload_tx));

        debug!(addr = %config.addr, "tcp client connected");

        Ok(Self {
            config,
            sink,
            payload_rx: Mutex::new(payload_rx),
            reader,
        })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Publishes a business message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn send(&self, message: &BusinessMessage) -> Result<(), ClientError> {
        let payload = message
            .to_vec()
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        self.send_payload(Bytes::from(payload)).await
    }

    /// Sends an arbitrary payload as one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send_payload(&self, payload: Bytes) -> Result<(), ClientError> {
        self.sink.lock().await.send(payload).await?;
        Ok(())
    }

    /// Writes bytes to the stream verbatim, bypassing the frame encoder.
    ///
    /// Useful for tooling that needs to emit hand-built or deliberately
    /// malformed frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send_raw(&self, raw: &[u8]) -> Result<(), ClientError> {
        let mut sink = self.sink.lock().await;
        let stream = sink.get_mut();
        stream.write_all(raw).await.map_err(CodecError::from)?;
        stream.flush().await.map_err(CodecError::from)?;
        Ok(())
    }

    /// Returns the next non-keepalive payload from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed.
    pub async fn next_payload(&self) -> Result<Bytes, ClientError> {
        self.payload_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(ClientError::Closed)
    }

    /// Returns the next broadcast from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the payload is not a
    /// broadcast object.
    pub async fn next_broadcast(&self) -> Result<Broadcast, ClientError> {
        let payload = self.next_payload().await?;
        serde_json::from_slice(&payload).map_err(|e| ClientError::Deserialization(e.to_string()))
    }

    /// Shuts down the write half and stops the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown write fails.
    pub async fn close(&self) -> Result<(), ClientError> {
        let result = self.sink.lock().await.close().await;
        self.reader.abort();
        result.map_err(ClientError::from)
    }
}

impl Drop for RelayTcpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut source: FrameSource,
    sink: Arc<Mutex<FrameSink>>,
    payload_tx: mpsc::Sender<Bytes>,
) {
    while let Some(result) = source.next().await {
        match result {
            Ok(payload) if payload.is_empty() => {
                // Echo keepalives so the server's idle deadline is refreshed.
                if let Err(e) = sink.lock().await.send(Bytes::new()).await {
                    warn!(error = %e, "failed to answer keepalive");
                    break;
                }
            }
            Ok(payload) => {
                if payload_tx.send(payload).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "tcp read failed");
                break;
            }
        }
    }
    debug!("tcp reader stopped");
}
