//! Relay server configuration.
//!
//! Provides configuration options for the relay server, loadable from
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionSettings;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default raw TCP port.
pub const DEFAULT_SOCKET_PORT: u16 = 9000;

/// Default WebSocket port.
pub const DEFAULT_WEBSOCKET_PORT: u16 = 9001;

/// Default WebSocket upgrade path.
pub const DEFAULT_WEBSOCKET_PATH: &str = "/ws";

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info,cmdrelay_server=debug";

/// Configuration for the relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host both listeners bind to.
    pub host: String,

    /// Raw TCP listener port (0 picks an ephemeral port).
    pub socket_port: u16,

    /// WebSocket listener port (0 picks an ephemeral port).
    pub websocket_port: u16,

    /// Path serving WebSocket upgrades.
    pub websocket_path: String,

    /// Flush interval in milliseconds.
    pub flush_interval_ms: u64,

    /// Idle timeout in seconds; keepalives go out at 9/10 of it.
    pub idle_timeout_secs: u64,

    /// Per-write timeout in seconds.
    pub write_timeout_secs: u64,

    /// Capacity of each connection's inbound and outbound queues.
    pub queue_capacity: usize,

    /// Largest payload accepted from a TCP peer.
    pub socket_max_message_size: usize,

    /// Largest message accepted from a WebSocket peer.
    pub websocket_max_message_size: usize,

    /// Upper bound on the shutdown drain, in seconds.
    pub shutdown_timeout_secs: u64,

    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Optional log file; stdout when unset.
    pub log_file: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            socket_port: DEFAULT_SOCKET_PORT,
            websocket_port: DEFAULT_WEBSOCKET_PORT,
            websocket_path: DEFAULT_WEBSOCKET_PATH.to_string(),
            flush_interval_ms: 100,
            idle_timeout_secs: 60,
            write_timeout_secs: 10,
            queue_capacity: 4096,
            socket_max_message_size: cmdrelay_sdk::DEFAULT_MAX_MESSAGE_SIZE,
            websocket_max_message_size: 512,
            shutdown_timeout_secs: 5,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
        }
    }
}

impl RelayConfig {
    /// Loads the configuration from `RELAY_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            host: lookup("RELAY_HOST").unwrap_or(defaults.host),
            socket_port: parse_var(&lookup, "RELAY_SOCKET_PORT", defaults.socket_port)?,
            websocket_port: parse_var(&lookup, "RELAY_WEBSOCKET_PORT", defaults.websocket_port)?,
            websocket_path: lookup("RELAY_WEBSOCKET_PATH").unwrap_or(defaults.websocket_path),
            flush_interval_ms: parse_var(
                &lookup,
                "RELAY_FLUSH_INTERVAL_MS",
                defaults.flush_interval_ms,
            )?,
            idle_timeout_secs: parse_var(
                &lookup,
                "RELAY_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout_secs,
            )?,
            write_timeout_secs: parse_var(
                &lookup,
                "RELAY_WRITE_TIMEOUT_SECS",
                defaults.write_timeout_secs,
            )?,
            queue_capacity: parse_var(&lookup, "RELAY_QUEUE_CAPACITY", defaults.queue_capacity)?,
            socket_max_message_size: parse_var(
                &lookup,
                "RELAY_SOCKET_MAX_MESSAGE_SIZE",
                defaults.socket_max_message_size,
            )?,
            websocket_max_message_size: parse_var(
                &lookup,
                "RELAY_WEBSOCKET_MAX_MESSAGE_SIZE",
                defaults.websocket_max_message_size,
            )?,
            shutdown_timeout_secs: parse_var(
                &lookup,
                "RELAY_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout_secs,
            )?,
            log_level: lookup("RELAY_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_file: lookup("RELAY_LOG_FILE").filter(|path| !path.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Sets the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the TCP and WebSocket ports.
    #[must_use]
    pub fn with_ports(mut self, socket_port: u16, websocket_port: u16) -> Self {
        self.socket_port = socket_port;
        self.websocket_port = websocket_port;
        self
    }

    /// Sets the flush interval.
    #[must_use]
    pub fn with_flush_interval(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the TCP and WebSocket inbound size limits.
    #[must_use]
    pub fn with_max_message_sizes(mut self, socket: usize, websocket: usize) -> Self {
        self.socket_max_message_size = socket;
        self.websocket_max_message_size = websocket;
        self
    }

    /// Sets the shutdown drain bound.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// Returns the TCP bind address.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.socket_port)
    }

    /// Returns the WebSocket bind address.
    #[must_use]
    pub fn websocket_addr(&self) -> String {
        format!("{}:{}", self.host, self.websocket_port)
    }

    /// Returns the flush interval.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Returns the idle timeout.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Returns the per-write timeout.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Returns the keepalive period, 9/10 of the idle timeout.
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        self.idle_timeout() * 9 / 10
    }

    /// Returns the shutdown drain bound.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns the per-connection engine settings.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            queue_capacity: self.queue_capacity,
            idle_timeout: self.idle_timeout(),
            write_timeout: self.write_timeout(),
            keepalive_interval: self.keepalive_interval(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        if !self.websocket_path.starts_with('/') {
            return Err(ConfigError::InvalidWebsocketPath(
                self.websocket_path.clone(),
            ));
        }

        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidFlushInterval);
        }

        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidIdleTimeout);
        }

        if self.write_timeout_secs == 0 {
            return Err(ConfigError::InvalidWriteTimeout);
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }

        let max_frame = i32::MAX as usize;
        if self.socket_max_message_size == 0 || self.socket_max_message_size > max_frame {
            return Err(ConfigError::InvalidMaxMessageSize("socket"));
        }

        if self.websocket_max_message_size == 0 {
            return Err(ConfigError::InvalidMaxMessageSize("websocket"));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVariable { key, value }),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds an unparsable value.
    #[error("{key} has invalid value {value:?}")]
    InvalidVariable {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// Empty bind host.
    #[error("host cannot be empty")]
    EmptyHost,

    /// WebSocket path does not start with a slash.
    #[error("websocket path must start with '/': {0}")]
    InvalidWebsocketPath(String),

    /// Invalid flush interval.
    #[error("flush_interval_ms must be > 0")]
    InvalidFlushInterval,

    /// Invalid idle timeout.
    #[error("idle_timeout_secs must be > 0")]
    InvalidIdleTimeout,

    /// Invalid write timeout.
    #[error("write_timeout_secs must be > 0")]
    InvalidWriteTimeout,

    /// Invalid queue capacity.
    #[error("queue_capacity must be > 0")]
    InvalidQueueCapacity,

    /// Invalid message size limit for the named transport.
    #[error("{0} max message size must be > 0 and fit a frame length")]
    InvalidMaxMessageSize(&'static str),
}
