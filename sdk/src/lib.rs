//! cmdrelay SDK: wire format and client library for the cmdrelay hub.
//!
//! This crate holds everything a peer of the relay needs: the TCP frame
//! codec, the business message types, and ready-made clients for both
//! transports.
//!
//! # Core Types
//!
//! - [`FrameCodec`]: `cmdmgt` tag + big-endian length framing for raw TCP
//! - [`BusinessMessage`]: one unit of relayed application data
//! - [`Protocol`]: which fan-out group a message belongs to
//! - [`Broadcast`]: the per-user aggregate pushed by every flush
//!
//! # Clients
//!
//! - [`tcp::RelayTcpClient`]: framed TCP client
//! - [`ws::RelayWsClient`]: WebSocket client
//!
//! # Example
//!
//! ```rust
//! use cmdrelay_sdk::{BusinessMessage, FrameCodec, Protocol};
//!
//! let message = BusinessMessage::new(Protocol::Socket, "u1").with_op_type("ping");
//! let payload = message.to_vec().unwrap_or_default();
//! let frame = FrameCodec::encode_frame(&payload).unwrap_or_default();
//!
//! let mut codec = FrameCodec::default();
//! let decoded = codec.feed(&frame);
//! assert_eq!(decoded.len(), 1);
//! assert_eq!(decoded[0], payload);
//! ```

pub mod codec;
pub mod error;
pub mod tcp;
pub mod types;
pub mod ws;

pub use codec::{FrameCodec, DEFAULT_MAX_MESSAGE_SIZE, FRAME_TAG, HEADER_SIZE};
pub use error::{ClientError, CodecError};
pub use types::{Broadcast, BusinessMessage, Protocol};
