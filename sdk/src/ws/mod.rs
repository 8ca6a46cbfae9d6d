//! WebSocket client for the relay.
//!
//! Publishes business messages as text frames and yields the broadcast
//! objects pushed by each flush cycle.
//!
//! # Example
//!
//! ```rust,ignore
//! use cmdrelay_sdk::ws::{RelayWsClient, WsConfig};
//! use cmdrelay_sdk::{BusinessMessage, Protocol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RelayWsClient::with_url("ws://127.0.0.1:9001/ws")?;
//!     client.connect().await?;
//!
//!     client
//!         .send(&BusinessMessage::new(Protocol::Websocket, "user-1"))
//!         .await?;
//!
//!     loop {
//!         let broadcast = client.next_broadcast().await?;
//!         println!("Received: {:?}", broadcast);
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::RelayWsClient;
pub use config::WsConfig;
pub use error::WsError;
