//! Relay server errors.

use crate::config::ConfigError;

/// Errors surfaced by the relay server's setup and run paths.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A listener could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Listener I/O failure after binding.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
