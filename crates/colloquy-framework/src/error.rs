//! Error types for the Colloquy framework.

use colloquy_core::ObjectType;
use thiserror::Error;

/// Boxed error returned by plugin factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by plugin registration.
///
/// All of these are detected before any state changes, so a failed call leaves
/// the target object exactly as it was.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The descriptor was compiled against an incompatible plugin API.
    #[error("plugin '{plugin}' targets plugin API {found}, host provides {host}")]
    IncompatiblePlugin {
        plugin: String,
        found: String,
        host: String,
    },

    /// Empty or whitespace-only identifier.
    #[error("invalid plugin identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Configuration is not a key/value map or has a malformed `events` section.
    #[error("invalid configuration for plugin '{plugin}': {reason}")]
    InvalidConfiguration { plugin: String, reason: String },

    /// Proto plugins are only accepted for chats, users, me and searches.
    #[error("proto plugins are not supported for object type '{0}'")]
    UnsupportedObjectType(ObjectType),

    /// The target object has been destructed.
    #[error("object '{0}' is no longer valid")]
    InvalidObject(String),

    /// An extension or middleware factory failed.
    #[error("plugin '{plugin}' failed to construct: {source}")]
    Factory {
        plugin: String,
        #[source]
        source: BoxError,
    },

    /// Nothing is registered under the identifier.
    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),
}

impl PluginError {
    pub fn invalid_configuration(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for plugin management operations.
pub type PluginResult<T> = Result<T, PluginError>;
