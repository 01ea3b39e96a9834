//! Error types for the polling engine.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`TransportError`].
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by the bus transport.
///
/// Everything here is transient from the engine's point of view except
/// [`TransportError::Connect`], which only occurs at startup and is treated
/// as a fatal precondition by the caller.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The serial link could not be opened.
    #[error("Failed to open serial link: {0}")]
    Connect(String),

    /// A query did not complete within the session timeout.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The device answered with a fault, or the line itself failed.
    #[error("Bus fault: {0}")]
    Link(String),
}

impl TransportError {
    /// Create a link-fault error.
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }
}
