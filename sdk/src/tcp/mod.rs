//! Framed TCP client for the relay.
//!
//! Speaks the `cmdmgt` frame format over a plain TCP stream, answers the
//! server's keepalive frames, and surfaces broadcasts as they arrive.
//!
//! # Example
//!
//! ```rust,ignore
//! use cmdrelay_sdk::tcp::{RelayTcpClient, TcpConfig};
//! use cmdrelay_sdk::{BusinessMessage, Protocol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RelayTcpClient::connect(TcpConfig::new("127.0.0.1:9000")).await?;
//!
//!     client
//!         .send(&BusinessMessage::new(Protocol::Socket, "u1").with_op_type("report"))
//!         .await?;
//!
//!     let broadcast = client.next_broadcast().await?;
//!     println!("Received {} user updates", broadcast.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;

pub use client::RelayTcpClient;
pub use config::TcpConfig;
