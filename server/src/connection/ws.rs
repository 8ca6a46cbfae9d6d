//! WebSocket transport over an upgraded axum socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use super::{Inbound, MessageSink, MessageSource, TransportError};

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl MessageSource for WsSource {
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        match self.stream.next().await {
            Some(Ok(message)) => Ok(classify(message)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.sink.send(outgoing(payload)).await?;
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<(), TransportError> {
        self.sink.send(Message::Ping(Bytes::new())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await?;
        Ok(())
    }
}

/// Splits an upgraded socket into its transport halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WsSource, WsSink) {
    let (sink, stream) = socket.split();
    (WsSource { stream }, WsSink { sink })
}

/// Maps a received frame to the engine's view. A close frame ends the stream.
fn classify(message: Message) -> Option<Inbound> {
    match message {
        Message::Text(text) => Some(Inbound::Message(Bytes::copy_from_slice(
            text.as_str().as_bytes(),
        ))),
        Message::Binary(data) => Some(Inbound::Message(data)),
        Message::Ping(_) | Message::Pong(_) => Some(Inbound::Heartbeat),
        Message::Close(_) => None,
    }
}

/// Broadcasts are JSON, so they go out as text; anything else as binary.
fn outgoing(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::Text(text.to_owned().into()),
        Err(_) => Message::Binary(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_text_and_binary() {
        assert_eq!(
            classify(Message::Text(String::from("{}").into())),
            Some(Inbound::Message(Bytes::from_static(b"{}")))
        );
        assert_eq!(
            classify(Message::Binary(Bytes::from_static(b"\x01"))),
            Some(Inbound::Message(Bytes::from_static(b"\x01")))
        );
    }

    #[test]
    fn test_classify_control_frames() {
        assert_eq!(
            classify(Message::Ping(Bytes::new())),
            Some(Inbound::Heartbeat)
        );
        assert_eq!(
            classify(Message::Pong(Bytes::new())),
            Some(Inbound::Heartbeat)
        );
        assert_eq!(classify(Message::Close(None)), None);
    }

    #[test]
    fn test_outgoing_json_is_text() {
        let message = outgoing(Bytes::from_static(br#"{"u1":{}}"#));
        assert!(matches!(message, Message::Text(ref t) if t.as_str() == r#"{"u1":{}}"#));
    }

    #[test]
    fn test_outgoing_non_utf8_is_binary() {
        let message = outgoing(Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(message, Message::Binary(_)));
    }
}
