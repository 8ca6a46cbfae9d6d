//! cmdrelay server - TCP/WebSocket command relay.
//!
//! Peers attach over raw TCP (framed with the `cmdmgt` tag) or WebSocket,
//! submit JSON business messages tagged by protocol and user id, and receive
//! periodic broadcasts holding the latest pending message per user.
//!
//! # Modules
//!
//! - [`connection`]: duplex engine shared by both transports
//! - [`registry`]: live connections per protocol
//! - [`listener`]: TCP accept loop and WebSocket upgrade route
//! - [`handler`]: parses inbound payloads and submits them
//! - [`relay`]: coalescing pending tables and the flush loop
//! - [`server`]: wires everything together and owns shutdown
//!
//! # Example
//!
//! ```rust,ignore
//! use cmdrelay_server::{RelayConfig, RelayServer};
//! use tokio_util::sync::CancellationToken;
//!
//! let server = RelayServer::new(RelayConfig::default())?;
//! let shutdown = CancellationToken::new();
//! let running = server.start(shutdown.clone()).await?;
//! println!("tcp on {}, ws on {}", running.socket_addr(), running.websocket_addr());
//! running.wait().await;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod listener;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod server;

pub use config::{ConfigError, RelayConfig};
pub use connection::{Connection, ConnectionError, ConnectionSettings, TransportError};
pub use error::RelayError;
pub use metrics::RelayMetrics;
pub use registry::ConnectionRegistry;
pub use relay::{BusinessRelay, FlushReport};
pub use server::{RelayServer, RunningServer};
