//! Runtime error types.

use colloquy_core::TransportError;
use colloquy_framework::PluginError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during engine and object operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The network refused or failed the operation.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Plugin registration failed.
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The object was destructed.
    #[error("Object is no longer valid: {0}")]
    InvalidObject(String),

    /// A chat name was rejected.
    #[error("Invalid chat name: {0:?}")]
    InvalidChatName(String),

    /// The engine was built without a transport.
    #[error("No transport configured")]
    MissingTransport,

    /// The transport's inbound stream was already taken by another consumer.
    #[error("Inbound message stream is unavailable")]
    InboundUnavailable,

    /// The engine was destroyed.
    #[error("Engine has been destroyed")]
    Destroyed,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
