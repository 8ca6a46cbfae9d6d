//! WebSocket listener.
//!
//! Serves upgrades on one path through axum; every successful upgrade
//! becomes a connection in the WebSocket registry.

use std::net::SocketAddr;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::ListenerContext;
use crate::connection;
use crate::error::RelayError;

/// Builds the router serving upgrades at `path`.
pub fn router(path: &str, ctx: ListenerContext) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}

/// WebSocket upgrade handler.
///
/// Requests that are not valid upgrades are logged and rejected.
pub async fn ws_handler(
    State(ctx): State<ListenerContext>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(remote_addr = %remote_addr, error = %rejection, "rejected websocket request");
            return rejection.into_response();
        }
    };

    let max_message_size = ctx.max_message_size;
    upgrade
        .max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_failed_upgrade(move |e| {
            warn!(remote_addr = %remote_addr, error = %e, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let (source, sink) = connection::ws::split(socket);
            ctx.serve(remote_addr, source, sink).await;
        })
}

/// HTTP server accepting WebSocket peers.
#[derive(Debug)]
pub struct WsRelayListener {
    listener: TcpListener,
    router: Router,
}

impl WsRelayListener {
    /// Binds `addr` and prepares the upgrade route at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: &str, path: &str, ctx: ListenerContext) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        info!(addr = %addr, path = %path, "websocket listener bound");
        Ok(Self {
            listener,
            router: router(path, ctx),
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves upgrades until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RelayError> {
        info!("websocket listener running, waiting for connections...");

        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

        info!("websocket listener stopped");
        Ok(())
    }

    /// Binds `addr` and serves on a new task.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be bound.
    pub async fn start(
        addr: &str,
        path: &str,
        ctx: ListenerContext,
        shutdown: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<()>), RelayError> {
        let listener = Self::bind(addr, path, ctx).await?;
        let local_addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(e) = listener.run(shutdown).await {
                error!(error = %e, "websocket listener failed");
            }
        });
        Ok((local_addr, task))
    }
}
