use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use colloquy_core::{EventPattern, ObjectHandle, ObjectType, Payload};

use crate::error::BoxError;
use crate::pipeline::Location;

// ─── PluginContext ────────────────────────────────────────────────────────────

/// Everything a factory knows about the instance it is building.
///
/// One context is created per extension and per middleware. It is owned by the
/// factory call; implementations copy out what they need.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(serde::Deserialize, Default)]
/// #[serde(default)]
/// struct FilterConfig { banned: Vec<String> }
///
/// fn create(ctx: &PluginContext) -> Result<Arc<dyn Middleware>, BoxError> {
///     let cfg: FilterConfig = ctx.config()?;
///     Ok(Arc::new(Filter { banned: cfg.banned }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PluginContext {
    identifier: String,
    plugin: &'static str,
    object: ObjectHandle,
    location: Option<Location>,
    events: Vec<EventPattern>,
    configuration: Arc<Value>,
}

impl PluginContext {
    pub(crate) fn new(
        identifier: &str,
        plugin: &'static str,
        object: ObjectHandle,
        location: Option<Location>,
        events: Vec<EventPattern>,
        configuration: Arc<Value>,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            plugin,
            object,
            location,
            events,
            configuration,
        }
    }

    /// Identifier the plugin is registered under on this object.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Name of the plugin descriptor.
    pub fn plugin_name(&self) -> &'static str {
        self.plugin
    }

    /// Weak handle to the object the instance is bound to.
    pub fn object(&self) -> &ObjectHandle {
        &self.object
    }

    pub fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    /// Pipeline location; `None` when building an extension.
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Event patterns the middleware will be selected for. Empty for extensions.
    pub fn events(&self) -> &[EventPattern] {
        &self.events
    }

    /// Raw configuration map (`Null` when none was given).
    pub fn configuration(&self) -> &Value {
        &self.configuration
    }

    /// Deserialises the configuration into `T`.
    ///
    /// An absent configuration is treated as an empty map, so a
    /// `#[serde(default)]` struct always deserialises.
    pub fn config<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        match self.configuration.as_ref() {
            Value::Null => T::deserialize(Value::Object(Map::new())),
            value => T::deserialize(value),
        }
    }
}

// ─── Extension ───────────────────────────────────────────────────────────────

/// Per-object capability contributed by a plugin.
///
/// Exactly one extension exists per (object, identifier) pair. Retrieve it with
/// [`PluginManager::extension`](crate::manager::PluginManager::extension).
pub trait Extension: Any + Send + Sync {
    /// Called once the registration is installed.
    fn on_create(&self) {}

    /// Called once the registration is removed or replaced.
    fn on_destruct(&self) {}

    /// Returns self as an `Arc<dyn Any>` for downcasting.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

// ─── Middleware ──────────────────────────────────────────────────────────────

/// Verdict of one middleware step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareFlow {
    /// Hand the (possibly modified) payload to the next middleware.
    Continue,
    /// Stop the chain; the event is not published or dispatched.
    Reject,
}

impl MiddlewareFlow {
    pub fn is_rejected(self) -> bool {
        self == Self::Reject
    }
}

/// Payload transformer bound to one object at one pipeline location.
///
/// `run` may suspend (e.g. for an external lookup); the next middleware
/// does not start until it returns.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Called once the registration is installed.
    fn on_create(&self) {}

    /// Called once the registration is removed or replaced.
    fn on_destruct(&self) {}

    /// Transforms `payload` in place.
    async fn run(&self, event: &str, payload: &mut Payload) -> MiddlewareFlow;
}

// ─── Factories ───────────────────────────────────────────────────────────────

/// Builds the extension for one object.
pub type ExtensionFactory = fn(&PluginContext) -> Result<Arc<dyn Extension>, BoxError>;

/// Builds one middleware instance for one object and location.
pub type MiddlewareFactory = fn(&PluginContext) -> Result<Arc<dyn Middleware>, BoxError>;

// ─── PluginMetadata ──────────────────────────────────────────────────────────

/// Descriptive metadata attached to every plugin.
///
/// Populated by [`define_plugin!`](crate::define_plugin):
///
/// | Field | Default |
/// |-------|---------|
/// | `version` | `CARGO_PKG_VERSION` of the defining crate |
/// | `desc` | `CARGO_PKG_DESCRIPTION` of the defining crate |
/// | `full_desc` | the `///` doc comment above `name:`, or `None` |
#[derive(Debug, Clone, Copy)]
pub struct PluginMetadata {
    pub version: &'static str,
    pub desc: &'static str,
    pub full_desc: Option<&'static str>,
}
