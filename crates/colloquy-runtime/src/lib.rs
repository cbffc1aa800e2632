//! Colloquy Runtime - the engine and the SDK objects it manages.
//!
//! This crate provides:
//! - The engine facade (`ChatEngine`, `EngineBuilder`)
//! - Chats, users, the local user, sessions, searches and emit trackers
//! - The wire envelope every published event travels in
//! - Layered configuration and logging
//!
//! ```ignore
//! use colloquy_runtime::ChatEngine;
//! use colloquy_core::MemoryNetwork;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let engine = ChatEngine::new(Arc::new(network.client("ada")));
//!
//!     // Joins the global chat and emits `$.ready`
//!     let me = engine.connect(None).await?;
//!
//!     let lobby = engine.chat("lobby")?;
//!     lobby.connect().await?;
//!     lobby.emit("message", json!({ "text": "hello" }))?;
//!
//!     engine.destroy().await;
//!     Ok(())
//! }
//! ```
//!
//! # Object lifetime
//!
//! The engine keeps chats, users and the local user alive until it is
//! destroyed. Searches and emit trackers are kept alive by the temporary
//! object store for its retention window, so callers may drop them right
//! after starting them.

pub mod config;
mod context;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod objects;

// Re-exports
pub use config::{
    ColloquyConfig, ConfigError, ConfigLoader, ConfigResult, EngineConfig, UserConfig,
};
pub use engine::{ChatEngine, EngineBuilder};
pub use envelope::Envelope;
pub use error::{EngineError, EngineResult};
pub use logging::{Component, LoggingBuilder, SpanEvents};
pub use objects::{
    Chat, EmitOutcome, Event, EventOutcome, Me, PluginHost, Search, SearchQuery, SearchStatus,
    Session, User,
};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
