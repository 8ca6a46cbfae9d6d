//! Business message types.
//!
//! Defines the JSON payloads carried inside TCP frames and WebSocket text
//! messages.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fan-out group a message is relayed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Raw TCP peers.
    Socket,
    /// WebSocket peers.
    Websocket,
}

impl Protocol {
    /// Every protocol the relay serves.
    pub const ALL: [Self; 2] = [Self::Socket, Self::Websocket];

    /// Returns the wire name of the protocol.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Websocket => "websocket",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of relayed application data.
///
/// `protocol` and `userId` are required on the wire; the remaining fields
/// default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessMessage {
    /// Fan-out group the message is published to.
    pub protocol: Protocol,

    /// Identifier of the publishing agent.
    #[serde(default)]
    pub source_id: String,

    /// User the message is about; the coalescing key.
    pub user_id: String,

    /// Operation type.
    #[serde(default)]
    pub op_type: String,

    /// Arbitrary payload.
    #[serde(default)]
    pub data: Value,
}

impl BusinessMessage {
    /// Creates a message with empty source, operation and data.
    #[must_use]
    pub fn new(protocol: Protocol, user_id: impl Into<String>) -> Self {
        Self {
            protocol,
            source_id: String::new(),
            user_id: user_id.into(),
            op_type: String::new(),
            data: Value::Null,
        }
    }

    /// Sets the source id.
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Sets the operation type.
    #[must_use]
    pub fn with_op_type(mut self, op_type: impl Into<String>) -> Self {
        self.op_type = op_type.into();
        self
    }

    /// Sets the data payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Parses a message from raw payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid message object.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Serializes the message to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Aggregate pushed by one flush cycle: latest message per user id.
pub type Broadcast = HashMap<String, BusinessMessage>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_wire_names() {
        assert_eq!(Protocol::Socket.as_str(), "socket");
        assert_eq!(Protocol::Websocket.to_string(), "websocket");
        assert_eq!(
            serde_json::to_string(&Protocol::Websocket).expect("serialize"),
            "\"websocket\""
        );
    }

    #[test]
    fn test_parse_full_message() {
        let raw = br#"{"protocol":"websocket","userId":"u2","sourceId":"s","opType":"ping","data":1}"#;
        let msg = BusinessMessage::from_slice(raw).expect("parse");
        assert_eq!(msg.protocol, Protocol::Websocket);
        assert_eq!(msg.user_id, "u2");
        assert_eq!(msg.source_id, "s");
        assert_eq!(msg.op_type, "ping");
        assert_eq!(msg.data, json!(1));
    }

    #[test]
    fn test_parse_defaults_optional_fields() {
        let raw = br#"{"protocol":"socket","userId":"u1"}"#;
        let msg = BusinessMessage::from_slice(raw).expect("parse");
        assert_eq!(msg, BusinessMessage::new(Protocol::Socket, "u1"));
    }

    #[test]
    fn test_parse_rejects_truncated_json() {
        assert!(BusinessMessage::from_slice(br#"{"userId":"u1""#).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_user() {
        assert!(BusinessMessage::from_slice(br#"{"protocol":"socket"}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_protocol() {
        let raw = br#"{"protocol":"carrier-pigeon","userId":"u1"}"#;
        assert!(BusinessMessage::from_slice(raw).is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let msg = BusinessMessage::new(Protocol::Socket, "u1")
            .with_source_id("agent-7")
            .with_op_type("set")
            .with_data(json!({"k": "v"}));
        let value: Value = serde_json::from_slice(&msg.to_vec().expect("serialize")).expect("json");
        assert_eq!(value["sourceId"], "agent-7");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["opType"], "set");
        assert_eq!(value["data"]["k"], "v");
    }
}
