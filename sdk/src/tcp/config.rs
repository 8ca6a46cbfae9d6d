//! TCP client configuration.
//!
//! Provides configuration options for the framed TCP client.

use std::time::Duration;

use crate::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::ClientError;

/// Default relay TCP address.
pub const DEFAULT_TCP_ADDR: &str = "127.0.0.1:9000";

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default capacity of the received-payload buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// TCP client configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Relay address (`host:port`).
    pub addr: String,

    /// Connect timeout.
    pub connect_timeout: Duration,

    /// Largest payload accepted from the server.
    pub max_message_size: usize,

    /// Number of received payloads buffered before reading stalls.
    pub buffer_capacity: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_TCP_ADDR.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            // Broadcasts aggregate many users, so accept far more than a
            // single peer message.
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE * 100,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl TcpConfig {
    /// Creates a new configuration with the given address.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the largest payload accepted from the server.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the received-payload buffer capacity.
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.addr.is_empty() {
            return Err(ClientError::InvalidConfig("addr cannot be empty".to_string()));
        }

        if self.max_message_size == 0 {
            return Err(ClientError::InvalidConfig(
                "max_message_size must be > 0".to_string(),
            ));
        }

        if self.buffer_capacity == 0 {
            return Err(ClientError::InvalidConfig(
                "buffer_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.addr, DEFAULT_TCP_ADDR);
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert!(config.max_message_size > DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_config_builder() {
        let config = TcpConfig::new("10.0.0.1:7000")
            .with_connect_timeout(Duration::from_secs(2))
            .with_max_message_size(4096)
            .with_buffer_capacity(8);

        assert_eq!(config.addr, "10.0.0.1:7000");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.buffer_capacity, 8);
    }

    #[test]
    fn test_config_validate_valid() {
        assert!(TcpConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validate_empty_addr() {
        assert!(TcpConfig::new("").validate().is_err());
    }

    #[test]
    fn test_config_validate_zero_buffer() {
        let config = TcpConfig::default().with_buffer_capacity(0);
        assert!(config.validate().is_err());
    }
}
