//! Per-connection handler: turns inbound payloads into relay submissions.

use std::sync::Arc;

use cmdrelay_sdk::BusinessMessage;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::metrics::RelayMetrics;
use crate::relay::BusinessRelay;

/// Reads payloads until the connection closes, submitting each valid
/// business message. Malformed payloads are logged and dropped; the
/// connection stays open.
pub async fn run_handler(
    connection: Arc<Connection>,
    relay: Arc<BusinessRelay>,
    metrics: Arc<RelayMetrics>,
) {
    while let Ok(payload) = connection.read_message().await {
        metrics.record_message_received();

        match BusinessMessage::from_slice(&payload) {
            Ok(message) => relay.submit(message),
            Err(e) => {
                metrics.record_parse_error();
                warn!(
                    conn_id = %connection.id(),
                    remote_addr = %connection.remote_addr(),
                    len = payload.len(),
                    error = %e,
                    "discarding malformed business message"
                );
            }
        }
    }

    metrics.record_connection_closed();
    debug!(conn_id = %connection.id(), "handler finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::spawn;
    use crate::connection::Inbound;
    use crate::registry::ConnectionRegistry;
    use bytes::Bytes;
    use cmdrelay_sdk::Protocol;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handler_submits_valid_and_skips_malformed() {
        let socket = Arc::new(ConnectionRegistry::new(Protocol::Socket));
        let websocket = Arc::new(ConnectionRegistry::new(Protocol::Websocket));
        let metrics = Arc::new(RelayMetrics::new());
        let relay = Arc::new(BusinessRelay::new(
            Arc::clone(&socket),
            Arc::clone(&websocket),
            Duration::from_millis(100),
            Duration::from_secs(1),
            Arc::clone(&metrics),
        ));

        let harness = spawn(&socket);
        let task = tokio::spawn(run_handler(
            Arc::clone(&harness.connection),
            Arc::clone(&relay),
            Arc::clone(&metrics),
        ));

        let payloads: [&[u8]; 3] = [
            br#"{"userId":"u1""#,
            br#"{"protocol":"socket","userId":"u1","opType":"set"}"#,
            br#"{"protocol":"websocket","userId":"u7"}"#,
        ];
        for payload in payloads {
            harness
                .peer_tx
                .send(Inbound::Message(Bytes::copy_from_slice(payload)))
                .expect("send");
        }
        drop(harness.peer_tx);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("handler finished")
            .expect("join");

        assert_eq!(metrics.messages_received(), 3);
        assert_eq!(metrics.parse_errors(), 1);
        assert_eq!(relay.pending_len(Protocol::Socket), 1);
        assert_eq!(relay.pending_len(Protocol::Websocket), 1);
        assert_eq!(metrics.connections_closed(), 1);
    }
}
