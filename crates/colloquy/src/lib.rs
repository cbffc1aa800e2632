//! # Colloquy
//!
//! A plugin-extensible chat SDK over a pub/sub network.
//!
//! ## Overview
//!
//! Colloquy turns raw publish/subscribe channels into chats, users and a local
//! user with a session. Every object carries its own event emitter, and
//! plugins attach per-object extensions and middlewares that can transform or
//! veto events on their way out and on their way in.
//!
//! ## Architecture
//!
//! ```text
//! Chat::publish ──▶ Emit middlewares ──▶ Transport::publish
//!                        │ reject
//!                        ▼
//!                   EmitOutcome::Rejected
//!
//! inbound stream ──▶ ChatEngine ──▶ envelope ──▶ On middlewares ──▶ chat emitter
//! ```
//!
//! - **Core**: event patterns, emitters, object identity, the transport trait
//! - **Framework**: plugin descriptors, the plugin manager, the middleware
//!   pipeline and the temporary object store
//! - **Runtime**: the engine facade, chats, users, searches and configuration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use colloquy::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let engine = ChatEngine::new(Arc::new(network.client("ada")));
//!     engine.register_proto_plugin(ObjectType::Chat, PluginRegistration::new(&SHOUT))?;
//!
//!     engine.connect(None).await?;
//!     let lobby = engine.chat("lobby")?;
//!     lobby.connect().await?;
//!     lobby.publish("message", json!({ "text": "hello" })).await?;
//!
//!     engine.destroy().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `colloquy.toml` (default)
//! - `yaml-config`: load `colloquy.yaml`
//! - `json-log`: JSON log output

pub use colloquy_core as core;
pub use colloquy_framework as framework;
pub use colloquy_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use colloquy::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Engine - main entry point
    pub use colloquy_runtime::{ChatEngine, ColloquyConfig, EngineError, EngineResult};

    // Objects
    pub use colloquy_runtime::{
        Chat, EmitOutcome, Event, EventOutcome, Me, PluginHost, Search, SearchQuery, SearchStatus,
        Session, User,
    };

    // Plugin system
    pub use async_trait::async_trait;
    pub use colloquy_framework::{
        BoxError, Extension, Middleware, MiddlewareFlow, PluginContext, PluginDescriptor,
        PluginRegistration, define_plugin,
    };

    // Events and transports
    pub use colloquy_core::{
        ChatObject, EmittedEvent, EventPattern, MemoryNetwork, ObjectType, Payload, Transport,
    };
    pub use serde_json::json;
}
