//! Raw TCP transport: `cmdmgt` frames over a split stream.
//!
//! Zero-length frames are keepalives in both directions.

use async_trait::async_trait;
use bytes::Bytes;
use cmdrelay_sdk::FrameCodec;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::{Inbound, MessageSink, MessageSource, TransportError};

/// Decoding half of a TCP connection.
#[derive(Debug)]
pub struct TcpSource<R> {
    frames: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead> TcpSource<R> {
    /// Wraps a reader; payloads above `max_message_size` are dropped as
    /// protocol errors.
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            frames: FramedRead::new(reader, FrameCodec::new(max_message_size)),
        }
    }
}

#[async_trait]
impl<R> MessageSource for TcpSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        match self.frames.next().await {
            Some(Ok(payload)) if payload.is_empty() => Ok(Some(Inbound::Heartbeat)),
            Some(Ok(payload)) => Ok(Some(Inbound::Message(payload))),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// Encoding half of a TCP connection.
#[derive(Debug)]
pub struct TcpSink<W> {
    frames: FramedWrite<W, FrameCodec>,
}

impl<W: AsyncWrite> TcpSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            frames: FramedWrite::new(writer, FrameCodec::default()),
        }
    }
}

#[async_trait]
impl<W> MessageSink for TcpSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.frames.send(payload).await?;
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<(), TransportError> {
        self.frames.send(Bytes::new()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.frames.close().await?;
        Ok(())
    }
}

/// Splits an accepted stream into its transport halves.
#[must_use]
pub fn split(
    stream: TcpStream,
    max_message_size: usize,
) -> (TcpSource<OwnedReadHalf>, TcpSink<OwnedWriteHalf>) {
    let (reader, writer) = stream.into_split();
    (TcpSource::new(reader, max_message_size), TcpSink::new(writer))
}
