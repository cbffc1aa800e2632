//! # Colloquy Framework
//!
//! Extensibility and lifetime management on top of the core object model.
//!
//! This layer provides:
//! - Plugin descriptors, extensions and middlewares ([`plugin`])
//! - The plugin manager with proto plugins and extension lookup ([`manager`])
//! - The sequential, short-circuiting middleware pipeline ([`pipeline`])
//! - Time-bounded retention of fire-and-forget objects ([`temporary`])

pub mod error;
pub mod manager;
pub mod pipeline;
pub mod plugin;
pub mod temporary;

pub use error::{BoxError, PluginError, PluginResult};
pub use manager::{ExtensionQuery, PluginManager};
pub use pipeline::{Location, PipelineOutcome};
pub use plugin::{
    COLLOQUY_PLUGIN_API_VERSION, Extension, ExtensionEntry, ExtensionFactory, Middleware,
    MiddlewareEntry, MiddlewareFactory, MiddlewareFlow, PluginContext, PluginDescriptor,
    PluginMetadata, PluginRegistration,
};
pub use temporary::{TemporaryConfig, TemporaryObjects};
