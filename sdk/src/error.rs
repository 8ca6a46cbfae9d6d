//! SDK error types.
//!
//! Provides error types for framing and TCP client operations.

/// Frame codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload does not fit the signed 32-bit length field.
    #[error("payload of {0} bytes does not fit the frame length field")]
    PayloadTooLarge(usize),

    /// Underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// TCP client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection attempt timed out.
    #[error("connection timed out")]
    Timeout,

    /// Frame encoding or stream failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Failed to serialize message.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize message.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connection closed.
    #[error("connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::PayloadTooLarge(42);
        assert_eq!(
            err.to_string(),
            "payload of 42 bytes does not fit the frame length field"
        );
    }

    #[test]
    fn test_client_error_from_codec() {
        let err: ClientError = CodecError::PayloadTooLarge(1).into();
        assert!(matches!(err, ClientError::Codec(_)));
    }

    #[test]
    fn test_client_error_closed() {
        assert_eq!(ClientError::Closed.to_string(), "connection closed");
    }
}
