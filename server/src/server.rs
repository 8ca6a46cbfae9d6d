//! Relay server: owns the registries, the relay and both listeners.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cmdrelay_sdk::Protocol;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::listener::{ListenerContext, TcpRelayListener, WsRelayListener};
use crate::metrics::RelayMetrics;
use crate::registry::ConnectionRegistry;
use crate::relay::BusinessRelay;

/// The relay server.
#[derive(Debug)]
pub struct RelayServer {
    /// Configuration.
    config: RelayConfig,

    /// Raw TCP connections.
    socket_registry: Arc<ConnectionRegistry>,

    /// WebSocket connections.
    websocket_registry: Arc<ConnectionRegistry>,

    /// Coalescing relay.
    relay: Arc<BusinessRelay>,

    /// Metrics.
    metrics: Arc<RelayMetrics>,
}

impl RelayServer {
    /// Creates a new relay server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;

        let socket_registry = Arc::new(ConnectionRegistry::new(Protocol::Socket));
        let websocket_registry = Arc::new(ConnectionRegistry::new(Protocol::Websocket));
        let metrics = Arc::new(RelayMetrics::new());
        let relay = Arc::new(BusinessRelay::new(
            Arc::clone(&socket_registry),
            Arc::clone(&websocket_registry),
            config.flush_interval(),
            config.write_timeout(),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            socket_registry,
            websocket_registry,
            relay,
            metrics,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Returns the relay.
    #[must_use]
    pub fn relay(&self) -> Arc<BusinessRelay> {
        Arc::clone(&self.relay)
    }

    /// Returns the registry of `protocol`.
    #[must_use]
    pub fn registry(&self, protocol: Protocol) -> Arc<ConnectionRegistry> {
        match protocol {
            Protocol::Socket => Arc::clone(&self.socket_registry),
            Protocol::Websocket => Arc::clone(&self.websocket_registry),
        }
    }

    fn listener_context(&self, protocol: Protocol, max_message_size: usize) -> ListenerContext {
        ListenerContext {
            registry: self.registry(protocol),
            relay: Arc::clone(&self.relay),
            metrics: Arc::clone(&self.metrics),
            settings: self.config.connection_settings(),
            max_message_size,
        }
    }

    /// Binds both listeners and starts every background task.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if either listener cannot bind.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<RunningServer, RelayError> {
        let (socket_addr, tcp_task) = TcpRelayListener::start(
            &self.config.socket_addr(),
            self.listener_context(Protocol::Socket, self.config.socket_max_message_size),
            shutdown.clone(),
        )
        .await?;

        let websocket = WsRelayListener::start(
            &self.config.websocket_addr(),
            &self.config.websocket_path,
            self.listener_context(Protocol::Websocket, self.config.websocket_max_message_size),
            shutdown.clone(),
        )
        .await;
        let (websocket_addr, ws_task) = match websocket {
            Ok(started) => started,
            Err(e) => {
                tcp_task.abort();
                return Err(e);
            }
        };

        let mut tasks = vec![tcp_task, ws_task];
        for protocol in Protocol::ALL {
            let relay = Arc::clone(&self.relay);
            let token = shutdown.clone();
            tasks.push(tokio::spawn(async move { relay.run(protocol, token).await }));
        }

        info!(
            socket_addr = %socket_addr,
            websocket_addr = %websocket_addr,
            path = %self.config.websocket_path,
            "relay server started"
        );

        Ok(RunningServer {
            socket_addr,
            websocket_addr,
            shutdown,
            tasks,
            registries: [
                Arc::clone(&self.socket_registry),
                Arc::clone(&self.websocket_registry),
            ],
            drain_timeout: self.config.shutdown_timeout(),
        })
    }

    /// Runs until `shutdown` fires, then drains.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if either listener cannot bind.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), RelayError> {
        self.start(shutdown).await?.wait().await;
        Ok(())
    }
}

/// Handle to a started server.
#[derive(Debug)]
pub struct RunningServer {
    socket_addr: SocketAddr,
    websocket_addr: SocketAddr,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    registries: [Arc<ConnectionRegistry>; 2],
    drain_timeout: Duration,
}

impl RunningServer {
    /// Returns the bound TCP address.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        self.socket_addr
    }

    /// Returns the bound WebSocket address.
    #[must_use]
    pub const fn websocket_addr(&self) -> SocketAddr {
        self.websocket_addr
    }

    /// Returns the token that stops the server.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Waits for shutdown, lets listeners and flush loops finish within the
    /// drain timeout, then closes every remaining connection.
    pub async fn wait(self) {
        self.shutdown.cancelled().await;
        info!("shutdown requested, draining");

        let tasks = futures::future::join_all(self.tasks);
        if tokio::time::timeout(self.drain_timeout, tasks).await.is_err() {
            warn!(
                timeout = ?self.drain_timeout,
                "drain timed out, closing remaining connections"
            );
        }

        let closed: usize = self
            .registries
            .iter()
            .map(|registry| registry.close_all())
            .sum();
        info!(closed, "relay server stopped");
    }

    /// Requests shutdown and waits for the drain.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> RelayConfig {
        RelayConfig::default()
            .with_host("127.0.0.1")
            .with_ports(0, 0)
            .with_flush_interval(20)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = local_config().with_queue_capacity(0);
        assert!(matches!(
            RelayServer::new(config),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_registries_by_protocol() {
        let server = RelayServer::new(local_config()).expect("server");
        assert_eq!(server.registry(Protocol::Socket).kind(), Protocol::Socket);
        assert_eq!(
            server.registry(Protocol::Websocket).kind(),
            Protocol::Websocket
        );
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let server = RelayServer::new(local_config()).expect("server");
        let running = server
            .start(CancellationToken::new())
            .await
            .expect("start");

        assert_ne!(running.socket_addr().port(), 0);
        assert_ne!(running.websocket_addr().port(), 0);

        tokio::time::timeout(Duration::from_secs(5), running.stop())
            .await
            .expect("stopped in time");
    }

    #[tokio::test]
    async fn test_start_reports_bind_failure() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = taken.local_addr().expect("addr").port();

        let server = RelayServer::new(local_config().with_ports(port, 0)).expect("server");
        let result = server.start(CancellationToken::new()).await;
        assert!(matches!(result, Err(RelayError::Bind { .. })));
    }
}
