//! Error types shared by the core layer.

use thiserror::Error;

/// Errors reported by a [`Transport`](crate::Transport) implementation.
///
/// The core never inspects the wire format; transports translate their own
/// failures into one of these variants.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport has no live connection to the network.
    #[error("transport is not connected")]
    NotConnected,

    /// The network refused the operation.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// Status code reported by the network.
        status: u16,
        /// Human-readable reason.
        message: String,
    },

    /// The operation did not complete in time.
    #[error("transport operation timed out")]
    Timeout,

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
