//! Plugin system for the Colloquy framework.
//!
//! # Architecture
//!
//! A plugin contributes behaviour to individual SDK objects. For each object
//! type it may provide:
//!
//! - one **extension**: per-object state and extra methods, looked up with
//!   [`PluginManager::extension`](crate::manager::PluginManager::extension);
//! - any number of **middlewares**: payload transformers that run at the
//!   [`Emit`](crate::pipeline::Location::Emit) or
//!   [`On`](crate::pipeline::Location::On) pipeline location for a set of
//!   event patterns.
//!
//! A [`PluginDescriptor`] is the *static, `Copy` handle* to a plugin. It lists
//! the capability entries with their factory functions, so the manager knows at
//! registration time what to build for a given object type.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use colloquy::prelude::*;
//!
//! struct Shout;
//!
//! #[async_trait]
//! impl Middleware for Shout {
//!     async fn run(&self, _event: &str, payload: &mut Payload) -> MiddlewareFlow {
//!         if let Some(text) = payload["text"].as_str() {
//!             payload["text"] = text.to_uppercase().into();
//!         }
//!         MiddlewareFlow::Continue
//!     }
//! }
//!
//! fn create_shout(_: &PluginContext) -> Result<Arc<dyn Middleware>, BoxError> {
//!     Ok(Arc::new(Shout))
//! }
//!
//! pub static SHOUT: PluginDescriptor = define_plugin! {
//!     name: "shout",
//!     middleware: { location: Emit, types: [Chat], events: ["message"], create: create_shout },
//! };
//! ```
//!
//! # Configuration
//!
//! Each registration carries an optional JSON map. When a registration has
//! none, the manager falls back to the section configured for its identifier
//! (`plugins.<identifier>` in `colloquy.toml`). Factories read it through
//! [`PluginContext::config`].
//!
//! ```toml
//! [plugins.profanity]
//! banned = ["darn"]
//! events = { emit = ["message", "reaction.*"] }
//! ```

// ─── Submodules ──────────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod descriptor;
pub mod macros;

// ─── Re-exports from submodules ──────────────────────────────────────────────
pub use config::PluginRegistration;
pub use core::{
    Extension, ExtensionFactory, Middleware, MiddlewareFactory, MiddlewareFlow, PluginContext,
    PluginMetadata,
};
pub use descriptor::{
    COLLOQUY_PLUGIN_API_VERSION, ExtensionEntry, MiddlewareEntry, PluginDescriptor,
};

// ─── Macro-internal re-export (needed by define_plugin! at call sites) ───────
#[doc(hidden)]
pub use colloquy_core::ObjectType as __ObjectType;

#[cfg(test)]
pub(crate) mod tests {
    use std::any::Any;
    use std::sync::Arc;

    use async_trait::async_trait;
    use colloquy_core::{ObjectType, Payload};

    use super::*;
    use crate::define_plugin;
    use crate::error::BoxError;

    pub(crate) static EMPTY: PluginDescriptor = define_plugin! {
        name: "empty",
    };

    struct Marker;

    impl Extension for Marker {
        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn create_marker(_: &PluginContext) -> Result<Arc<dyn Extension>, BoxError> {
        Ok(Arc::new(Marker))
    }

    struct Pass;

    #[async_trait]
    impl Middleware for Pass {
        async fn run(&self, _event: &str, _payload: &mut Payload) -> MiddlewareFlow {
            MiddlewareFlow::Continue
        }
    }

    fn create_pass(_: &PluginContext) -> Result<Arc<dyn Middleware>, BoxError> {
        Ok(Arc::new(Pass))
    }

    static FULL: PluginDescriptor = define_plugin! {
        /// Marks chats and users.
        name: "full",
        extension: { types: [Chat, User], create: create_marker },
        extension: { types: [Me], create: create_marker },
        middleware: {
            location: Emit,
            types: [Chat],
            events: ["message", "reaction.*"],
            create: create_pass,
        },
        middleware: { location: On, types: [Chat, Search], events: ["*"], create: create_pass },
        metadata: { version: "9.9.9", desc: "test plugin" },
    };

    #[test]
    fn test_define_plugin_collects_entries() {
        assert_eq!(FULL.name, "full");
        assert!(FULL.is_compatible());
        assert_eq!(FULL.extensions.len(), 2);
        assert_eq!(FULL.middlewares.len(), 2);
        assert_eq!(FULL.middlewares[0].events, &["message", "reaction.*"]);
        assert_eq!(FULL.metadata.version, "9.9.9");
        assert_eq!(FULL.metadata.desc, "test plugin");
        assert!(FULL.metadata.full_desc.is_some_and(|d| d.contains("Marks chats")));
    }

    #[test]
    fn test_capabilities_per_object_type() {
        assert!(FULL.extension_for(ObjectType::User).is_some());
        assert!(FULL.extension_for(ObjectType::Search).is_none());
        assert_eq!(FULL.middlewares_for(ObjectType::Chat).count(), 2);
        assert_eq!(FULL.middlewares_for(ObjectType::Search).count(), 1);
        assert!(FULL.supports(ObjectType::Me));
        assert!(!FULL.supports(ObjectType::Session));
        assert!(!EMPTY.supports(ObjectType::Chat));
    }

    #[test]
    fn test_version_compatibility() {
        let mut descriptor = EMPTY;
        assert!(descriptor.is_compatible());

        descriptor.api_version = COLLOQUY_PLUGIN_API_VERSION + 1;
        assert!(!descriptor.is_compatible());

        descriptor.api_version = 0x0002_0000;
        assert!(!descriptor.is_compatible());
    }
}
