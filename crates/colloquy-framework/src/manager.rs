//! Plugin registration, extension lookup and middleware execution.
//!
//! [`PluginManager`] is the single owner of every plugin installed on every
//! SDK object. It:
//!
//! - Validates a [`PluginRegistration`] and builds the plugin's extension and
//!   middlewares for the object **before** touching any state, so a failed
//!   registration leaves the object exactly as it was.
//! - Replaces an existing registration with the same identifier (the old
//!   instances receive `on_destruct`, the new ones `on_create`).
//! - Keeps type-level ("proto") registrations and applies them to new objects
//!   via [`setup_proto_plugins_for`](PluginManager::setup_proto_plugins_for).
//! - Runs the middleware pipeline for an object
//!   ([`run_middlewares`](PluginManager::run_middlewares)).
//!
//! # Locking
//!
//! All state sits behind one mutex. Factories, lifecycle hooks and
//! middlewares always run with the lock released, so they may call back into
//! the manager.
//!
//! Registration changes and the hooks they fire are serialized by a second,
//! reentrant lock. A plugin's `on_create` therefore always completes before
//! its `on_destruct` starts, even when another thread unregisters it in
//! between. Hooks may re-enter the manager on their own thread but must not
//! wait on another thread that registers or unregisters plugins.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = PluginManager::new(HashMap::new());
//!
//! manager.register_proto_plugin(ObjectType::Chat, PluginRegistration::new(&PROFANITY))?;
//! manager.setup_proto_plugins_for(&chat);
//!
//! match manager.run_middlewares(Location::Emit, "message", &*chat, payload).await {
//!     PipelineOutcome::Delivered(payload) => publish(payload).await,
//!     PipelineOutcome::Rejected { plugin } => info!(%plugin, "message vetoed"),
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use colloquy_core::{ChatObject, ObjectHandle, ObjectId, ObjectType, Payload};

use crate::error::{PluginError, PluginResult};
use crate::pipeline::{self, Location, MiddlewareSlot, PipelineOutcome};
use crate::plugin::config::EventOverrides;
use crate::plugin::descriptor::format_api_version;
use crate::plugin::{
    COLLOQUY_PLUGIN_API_VERSION, Extension, Middleware, PluginContext, PluginDescriptor,
    PluginRegistration,
};

// =============================================================================
// ExtensionQuery
// =============================================================================

/// How to find an extension on an object.
#[derive(Debug, Clone, Copy)]
pub enum ExtensionQuery<'a> {
    /// The registration with exactly this identifier.
    Identifier(&'a str),
    /// The first registration of this plugin in execution order, whatever its
    /// identifier.
    ///
    /// Plugins are told apart by [`PluginDescriptor::name`]: registrations
    /// store a copy of their descriptor, so any descriptor carrying the same
    /// name matches.
    Plugin(&'a PluginDescriptor),
}

impl<'a> From<&'a str> for ExtensionQuery<'a> {
    fn from(identifier: &'a str) -> Self {
        Self::Identifier(identifier)
    }
}

impl<'a> From<&'a String> for ExtensionQuery<'a> {
    fn from(identifier: &'a String) -> Self {
        Self::Identifier(identifier)
    }
}

impl<'a> From<&'a PluginDescriptor> for ExtensionQuery<'a> {
    fn from(descriptor: &'a PluginDescriptor) -> Self {
        Self::Plugin(descriptor)
    }
}

// =============================================================================
// Internal records
// =============================================================================

/// One plugin installed on one object.
struct Installed {
    identifier: String,
    plugin: &'static str,
    extension: Option<Arc<dyn Extension>>,
    middlewares: Vec<MiddlewareSlot>,
}

impl Installed {
    fn matches(&self, query: ExtensionQuery<'_>) -> bool {
        match query {
            ExtensionQuery::Identifier(identifier) => self.identifier == identifier,
            ExtensionQuery::Plugin(descriptor) => self.plugin == descriptor.name,
        }
    }

    fn hooks(&self) -> Hooks {
        Hooks {
            extension: self.extension.clone(),
            middlewares: self
                .middlewares
                .iter()
                .map(|slot| Arc::clone(&slot.middleware))
                .collect(),
        }
    }
}

/// Lifecycle targets of one installation, fired outside the lock.
struct Hooks {
    extension: Option<Arc<dyn Extension>>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Hooks {
    fn on_create(&self) {
        if let Some(extension) = &self.extension {
            extension.on_create();
        }
        for middleware in &self.middlewares {
            middleware.on_create();
        }
    }

    fn on_destruct(&self) {
        if let Some(extension) = &self.extension {
            extension.on_destruct();
        }
        for middleware in &self.middlewares {
            middleware.on_destruct();
        }
    }
}

/// A validated registration, ready to be built for an object.
struct Prepared {
    descriptor: PluginDescriptor,
    identifier: String,
    configuration: Arc<Value>,
    overrides: EventOverrides,
    insert_first: bool,
}

#[derive(Default)]
struct ManagerState {
    /// Installed plugins per object, in execution order.
    objects: HashMap<ObjectId, Vec<Installed>>,
    /// Proto registrations per object type, in application order.
    protos: HashMap<ObjectType, Vec<PluginRegistration>>,
}

// =============================================================================
// PluginManager
// =============================================================================

/// Central manager for plugin registration, lookup and middleware execution.
///
/// # Plugin configuration
///
/// `plugin_configs` maps an identifier (or plugin name) to its default
/// configuration section. Registrations without explicit configuration fall
/// back to it: first by identifier, then by plugin name.
pub struct PluginManager {
    state: Mutex<ManagerState>,
    /// Held across a registration change and the hooks it fires.
    lifecycle: ReentrantMutex<()>,
    plugin_configs: HashMap<String, Value>,
}

impl PluginManager {
    /// Creates a manager with the given per-plugin config map.
    pub fn new(plugin_configs: HashMap<String, Value>) -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
            lifecycle: ReentrantMutex::new(()),
            plugin_configs,
        }
    }

    // ─── Object-level registration ───────────────────────────────────────────

    /// Installs a plugin on `object`.
    ///
    /// Any registration already using the same identifier is replaced. On
    /// error nothing changes: no instance is kept and the previous
    /// registration (if any) stays in place.
    ///
    /// The replaced instances get `on_destruct` before the new ones get
    /// `on_create`. A concurrent [`unregister_plugin`](Self::unregister_plugin)
    /// of the same identifier waits for `on_create` to return.
    pub fn register_plugin(
        &self,
        object: &Arc<dyn ChatObject>,
        registration: PluginRegistration,
    ) -> PluginResult<()> {
        let prepared = self.prepare(&registration)?;
        self.install(object, prepared)
    }

    /// Removes the registration `identifier` from `object`.
    pub fn unregister_plugin(&self, object: &dyn ChatObject, identifier: &str) -> PluginResult<()> {
        let _lifecycle = self.lifecycle.lock();
        let removed = {
            let mut state = self.state.lock();
            let id = object.id();
            let plugins = state
                .objects
                .get_mut(&id)
                .ok_or_else(|| PluginError::NotRegistered(identifier.to_string()))?;
            let index = plugins
                .iter()
                .position(|installed| installed.identifier == identifier)
                .ok_or_else(|| PluginError::NotRegistered(identifier.to_string()))?;
            let removed = plugins.remove(index);
            if plugins.is_empty() {
                state.objects.remove(&id);
            }
            removed
        };

        removed.hooks().on_destruct();
        info!(
            plugin = %identifier,
            object = %object.identifier(),
            "Plugin unregistered"
        );
        Ok(())
    }

    /// Removes every registration from `object`, in execution order.
    ///
    /// Returns the number of registrations removed.
    pub fn unregister_all(&self, object: &dyn ChatObject) -> usize {
        let _lifecycle = self.lifecycle.lock();
        let removed = self.state.lock().objects.remove(&object.id());
        let Some(removed) = removed else {
            return 0;
        };

        for installed in &removed {
            installed.hooks().on_destruct();
        }
        debug!(
            object = %object.identifier(),
            count = removed.len(),
            "All plugins unregistered"
        );
        removed.len()
    }

    /// Returns `true` when `identifier` is registered on `object`.
    pub fn has_plugin(&self, object: &dyn ChatObject, identifier: &str) -> bool {
        self.state
            .lock()
            .objects
            .get(&object.id())
            .is_some_and(|plugins| plugins.iter().any(|p| p.identifier == identifier))
    }

    /// Identifiers registered on `object`, in execution order.
    pub fn plugin_identifiers(&self, object: &dyn ChatObject) -> Vec<String> {
        self.state
            .lock()
            .objects
            .get(&object.id())
            .map(|plugins| plugins.iter().map(|p| p.identifier.clone()).collect())
            .unwrap_or_default()
    }

    // ─── Proto registration ──────────────────────────────────────────────────

    /// Registers a plugin for every **future** object of `object_type`.
    ///
    /// Existing objects are not affected. Only chats, users, me and searches
    /// accept proto plugins.
    pub fn register_proto_plugin(
        &self,
        object_type: ObjectType,
        registration: PluginRegistration,
    ) -> PluginResult<()> {
        if !object_type.supports_proto_plugins() {
            return Err(PluginError::UnsupportedObjectType(object_type));
        }
        let prepared = self.prepare(&registration)?;

        let replaced = {
            let mut state = self.state.lock();
            let protos = state.protos.entry(object_type).or_default();
            let replaced = remove_where(protos, |r| r.plugin_identifier() == prepared.identifier);
            if prepared.insert_first {
                protos.insert(0, registration);
            } else {
                protos.push(registration);
            }
            replaced.is_some()
        };

        info!(
            plugin = %prepared.identifier,
            object_type = %object_type,
            replaced,
            "Proto plugin registered"
        );
        Ok(())
    }

    /// Removes a proto registration. Objects that already received it keep it.
    pub fn unregister_proto_plugin(
        &self,
        object_type: ObjectType,
        identifier: &str,
    ) -> PluginResult<()> {
        let mut state = self.state.lock();
        let removed = state
            .protos
            .get_mut(&object_type)
            .and_then(|protos| remove_where(protos, |r| r.plugin_identifier() == identifier));
        match removed {
            Some(_) => {
                info!(plugin = %identifier, object_type = %object_type, "Proto plugin unregistered");
                Ok(())
            }
            None => Err(PluginError::NotRegistered(identifier.to_string())),
        }
    }

    /// Proto identifiers for `object_type`, in application order.
    pub fn proto_plugin_identifiers(&self, object_type: ObjectType) -> Vec<String> {
        self.state
            .lock()
            .protos
            .get(&object_type)
            .map(|protos| {
                protos
                    .iter()
                    .map(|r| r.plugin_identifier().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Applies every proto registration for `object`'s type, in order.
    ///
    /// A proto plugin that fails for this object is logged and skipped.
    /// Returns the number applied.
    pub fn setup_proto_plugins_for(&self, object: &Arc<dyn ChatObject>) -> usize {
        let registrations = self
            .state
            .lock()
            .protos
            .get(&object.object_type())
            .cloned()
            .unwrap_or_default();

        let mut applied = 0;
        for registration in registrations {
            let identifier = registration.plugin_identifier().to_string();
            match self.register_plugin(object, registration) {
                Ok(()) => applied += 1,
                Err(e) => warn!(
                    plugin = %identifier,
                    object = %object.identifier(),
                    error = %e,
                    "Proto plugin could not be applied"
                ),
            }
        }
        applied
    }

    // ─── Extension lookup ────────────────────────────────────────────────────

    /// Finds an extension on `object`.
    pub fn extension_for<'a>(
        &self,
        object: &dyn ChatObject,
        query: impl Into<ExtensionQuery<'a>>,
    ) -> Option<Arc<dyn Extension>> {
        let query = query.into();
        self.state
            .lock()
            .objects
            .get(&object.id())?
            .iter()
            .filter(|installed| installed.matches(query))
            .find_map(|installed| installed.extension.clone())
    }

    /// Finds an extension on `object` and downcasts it to `T`.
    pub fn extension<'a, T: Extension>(
        &self,
        object: &dyn ChatObject,
        query: impl Into<ExtensionQuery<'a>>,
    ) -> Option<Arc<T>> {
        self.extension_for(object, query)
            .and_then(|extension| Arc::downcast::<T>(extension.as_any()).ok())
    }

    // ─── Middleware pipeline ─────────────────────────────────────────────────

    /// Runs the middlewares bound to `object` at `location` for `event`.
    ///
    /// Middlewares are selected under the lock, in plugin order, then executed
    /// one after another with the lock released.
    pub async fn run_middlewares(
        &self,
        location: Location,
        event: &str,
        object: &dyn ChatObject,
        payload: Payload,
    ) -> PipelineOutcome {
        let slots = self.select_slots(location, event, object.id());
        if slots.is_empty() {
            trace!(location = %location, event, object = %object.identifier(), "No middlewares");
            return PipelineOutcome::Delivered(payload);
        }

        pipeline::run_chain(slots, location, event, object.identifier(), payload).await
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Snapshot of the middlewares an event runs through, in plugin order.
    fn select_slots(
        &self,
        location: Location,
        event: &str,
        object: ObjectId,
    ) -> Vec<MiddlewareSlot> {
        self.state
            .lock()
            .objects
            .get(&object)
            .map(|plugins| {
                plugins
                    .iter()
                    .flat_map(|installed| installed.middlewares.iter())
                    .filter(|slot| slot.selects(location, event))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validates a registration without building anything.
    fn prepare(&self, registration: &PluginRegistration) -> PluginResult<Prepared> {
        let descriptor = *registration.descriptor();
        if !descriptor.is_compatible() {
            return Err(PluginError::IncompatiblePlugin {
                plugin: descriptor.name.to_string(),
                found: format_api_version(descriptor.api_version),
                host: format_api_version(COLLOQUY_PLUGIN_API_VERSION),
            });
        }
        if descriptor.name.trim().is_empty() {
            return Err(PluginError::InvalidIdentifier(descriptor.name.to_string()));
        }

        let identifier = registration.plugin_identifier();
        if identifier.trim().is_empty() {
            return Err(PluginError::InvalidIdentifier(identifier.to_string()));
        }

        let configuration = registration
            .explicit_configuration()
            .or_else(|| self.plugin_configs.get(identifier))
            .or_else(|| self.plugin_configs.get(descriptor.name))
            .cloned()
            .unwrap_or(Value::Null);
        let overrides = EventOverrides::parse(identifier, &configuration)?;

        Ok(Prepared {
            descriptor,
            identifier: identifier.to_string(),
            configuration: Arc::new(configuration),
            overrides,
            insert_first: registration.is_insert_first(),
        })
    }

    /// Builds every instance for `object`. Nothing is installed yet.
    fn build(&self, object: &Arc<dyn ChatObject>, prepared: &Prepared) -> PluginResult<Installed> {
        let handle = ObjectHandle::new(object);
        let object_type = object.object_type();
        let descriptor = &prepared.descriptor;
        let factory_error = |source| PluginError::Factory {
            plugin: prepared.identifier.clone(),
            source,
        };

        let extension = match descriptor.extension_for(object_type) {
            Some(entry) => {
                let ctx = PluginContext::new(
                    &prepared.identifier,
                    descriptor.name,
                    handle.clone(),
                    None,
                    Vec::new(),
                    Arc::clone(&prepared.configuration),
                );
                Some((entry.create)(&ctx).map_err(factory_error)?)
            }
            None => None,
        };

        let mut middlewares = Vec::new();
        for entry in descriptor.middlewares_for(object_type) {
            let events = prepared.overrides.patterns_for(entry.location, entry.events);
            let ctx = PluginContext::new(
                &prepared.identifier,
                descriptor.name,
                handle.clone(),
                Some(entry.location),
                events.clone(),
                Arc::clone(&prepared.configuration),
            );
            let middleware = (entry.create)(&ctx).map_err(factory_error)?;
            middlewares.push(MiddlewareSlot {
                plugin: prepared.identifier.clone(),
                location: entry.location,
                events,
                object: handle.clone(),
                middleware,
            });
        }

        if extension.is_none() && middlewares.is_empty() {
            debug!(
                plugin = %prepared.identifier,
                object_type = %object_type,
                "Plugin provides nothing for this object type"
            );
        }

        Ok(Installed {
            identifier: prepared.identifier.clone(),
            plugin: descriptor.name,
            extension,
            middlewares,
        })
    }

    fn install(&self, object: &Arc<dyn ChatObject>, prepared: Prepared) -> PluginResult<()> {
        if !object.is_valid() {
            return Err(PluginError::InvalidObject(object.identifier().to_string()));
        }

        let installed = self.build(object, &prepared)?;
        let hooks = installed.hooks();

        let _lifecycle = self.lifecycle.lock();
        let replaced = {
            let mut state = self.state.lock();
            // The object may have been destructed while the factories ran.
            if !object.is_valid() {
                return Err(PluginError::InvalidObject(object.identifier().to_string()));
            }
            let plugins = state.objects.entry(object.id()).or_default();
            let replaced = remove_where(plugins, |p| p.identifier == prepared.identifier);
            if prepared.insert_first {
                plugins.insert(0, installed);
            } else {
                plugins.push(installed);
            }
            replaced
        };

        if let Some(old) = &replaced {
            old.hooks().on_destruct();
        }
        hooks.on_create();

        info!(
            plugin = %prepared.identifier,
            object = %object.identifier(),
            replaced = replaced.is_some(),
            "Plugin registered"
        );
        Ok(())
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PluginManager")
            .field("objects", &state.objects.len())
            .field("proto_types", &state.protos.len())
            .finish()
    }
}

fn remove_where<T>(items: &mut Vec<T>, predicate: impl Fn(&T) -> bool) -> Option<T> {
    items
        .iter()
        .position(predicate)
        .map(|index| items.remove(index))
}

// =============================================================================
// Tests
// =============================================================================
