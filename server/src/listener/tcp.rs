//! Raw TCP listener.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ListenerContext;
use crate::connection;
use crate::error::RelayError;

/// Accept loop for framed TCP peers.
#[derive(Debug)]
pub struct TcpRelayListener {
    listener: TcpListener,
    ctx: ListenerContext,
}

impl TcpRelayListener {
    /// Binds `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: &str, ctx: ListenerContext) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        info!(addr = %addr, "tcp listener bound");
        Ok(Self { listener, ctx })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts peers until `shutdown` fires. Accept errors are logged and
    /// the loop continues.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("tcp listener running, waiting for connections...");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(remote_addr = %remote_addr, error = %e, "failed to set TCP_NODELAY");
                        }
                        let (source, sink) =
                            connection::tcp::split(stream, self.ctx.max_message_size);
                        let ctx = self.ctx.clone();
                        tokio::spawn(async move { ctx.serve(remote_addr, source, sink).await });
                    }
                    Err(e) => warn!(error = %e, "failed to accept tcp connection"),
                },
            }
        }

        info!("tcp listener stopped");
    }

    /// Binds `addr` and runs the accept loop on a new task.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be bound.
    pub async fn start(
        addr: &str,
        ctx: ListenerContext,
        shutdown: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<()>), RelayError> {
        let listener = Self::bind(addr, ctx).await?;
        let local_addr = listener.local_addr()?;
        Ok((local_addr, tokio::spawn(listener.run(shutdown))))
    }
}
