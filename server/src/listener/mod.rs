//! Transport listeners.
//!
//! Both listeners share the same contract: `bind` then `run(shutdown)`,
//! or `start` to do both. Every accepted peer becomes a [`Connection`],
//! is registered, and gets a handler task.

pub mod tcp;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::connection::{Connection, ConnectionSettings, MessageSink, MessageSource};
use crate::handler::run_handler;
use crate::metrics::RelayMetrics;
use crate::registry::ConnectionRegistry;
use crate::relay::BusinessRelay;

pub use tcp::TcpRelayListener;
pub use ws::WsRelayListener;

/// Everything a listener needs to turn an accepted transport into a
/// served connection.
#[derive(Debug, Clone)]
pub struct ListenerContext {
    /// Registry accepted connections join.
    pub registry: Arc<ConnectionRegistry>,
    /// Relay receiving submitted messages.
    pub relay: Arc<BusinessRelay>,
    /// Shared metrics.
    pub metrics: Arc<RelayMetrics>,
    /// Per-connection engine settings.
    pub settings: ConnectionSettings,
    /// Largest message accepted from a peer.
    pub max_message_size: usize,
}

impl ListenerContext {
    /// Wraps a transport, registers it and runs its handler to completion.
    pub async fn serve<S, K>(&self, remote_addr: SocketAddr, source: S, sink: K)
    where
        S: MessageSource,
        K: MessageSink,
    {
        let connection = Connection::spawn(
            self.registry.kind(),
            remote_addr,
            source,
            sink,
            self.settings,
            &self.registry,
        );
        self.metrics.record_connection_opened();

        if !self.registry.register(Arc::clone(&connection)) {
            debug!(conn_id = %connection.id(), "connection closed before registration");
        }

        info!(
            conn_id = %connection.id(),
            remote_addr = %remote_addr,
            protocol = %connection.kind(),
            active = self.registry.len(),
            "peer connected"
        );

        run_handler(
            Arc::clone(&connection),
            Arc::clone(&self.relay),
            Arc::clone(&self.metrics),
        )
        .await;

        info!(
            conn_id = %connection.id(),
            remote_addr = %remote_addr,
            protocol = %connection.kind(),
            "peer disconnected"
        );
    }
}
