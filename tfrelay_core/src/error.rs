//! Error types for the relay engine
//!
//! Only startup errors (`ConfigParse`, `TransportInit`) are meant to cross
//! the process boundary. Steady-state errors such as `TransportPublish` are
//! absorbed by the relay workers and only show up in logs and counters.

use thiserror::Error;

/// Errors produced by the relay engine and its buses
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed static-transform or mapping declaration
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    /// A transform bus failed to initialize
    #[error("Transport init error: {0}")]
    TransportInit(String),

    /// A publish call failed during steady-state relay
    #[error("Transport publish error: {0}")]
    TransportPublish(String),

    /// The bus handle was already shut down
    #[error("Bus '{0}' is closed")]
    BusClosed(String),

    /// A transform sample violated its construction invariants
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// A lifecycle operation was requested from the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid runtime configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Shorthand for a config parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        RelayError::ConfigParse(msg.into())
    }

    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    /// Shorthand for a transport init error
    pub fn transport_init(msg: impl Into<String>) -> Self {
        RelayError::TransportInit(msg.into())
    }

    /// Shorthand for a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        RelayError::TransportPublish(msg.into())
    }

    /// Whether this error must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::ConfigParse(_) | RelayError::TransportInit(_) | RelayError::Config(_)
        )
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
