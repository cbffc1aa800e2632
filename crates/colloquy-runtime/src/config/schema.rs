//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use colloquy_framework::TemporaryConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration structure.
///
/// ```toml
/// [engine]
/// namespace = "acme"
///
/// [user]
/// uuid = "ian"
/// state = { team = "red" }
///
/// [logging]
/// level = "debug"
///
/// [plugins.profanity]
/// banned = ["darn"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColloquyConfig {
    /// Engine-wide settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// The local user.
    #[serde(default)]
    pub user: UserConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default plugin configuration keyed by plugin identifier.
    #[serde(default)]
    pub plugins: HashMap<String, Value>,
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix of every channel the engine publishes to.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the chat every client joins on connect.
    #[serde(default = "default_global_channel")]
    pub global_channel: String,

    /// How long fire-and-forget objects are kept alive, in seconds.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Period of the temporary object sweeper, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Number of history messages fetched per search page.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            global_channel: default_global_channel(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            history_page_size: default_history_page_size(),
        }
    }
}

impl EngineConfig {
    /// Timing of the engine's temporary object store.
    pub fn temporary(&self) -> TemporaryConfig {
        TemporaryConfig {
            retention: Duration::from_secs(self.retention_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

fn default_namespace() -> String {
    "chat-engine".to_string()
}

fn default_global_channel() -> String {
    "global".to_string()
}

fn default_retention_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_history_page_size() -> usize {
    100
}

/// The local user.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Unique id of the local user; the transport's uuid is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Initial state announced on the global chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level name as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Log file used when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `colloquy_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Log every middleware chain run at debug level, with its `pipeline`
    /// span opened and closed.
    #[serde(default)]
    pub trace_pipelines: bool,
}
