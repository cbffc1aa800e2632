//! The SDK objects: chats, users, the local user, sessions, searches and
//! emit trackers.
//!
//! Every object composes an [`ObjectCore`](colloquy_core::ObjectCore) (identity,
//! validity flag, event emitter) and can carry plugins through
//! [`PluginHost`].

use std::sync::Arc;

use colloquy_core::ChatObject;
use colloquy_framework::{
    Extension, ExtensionQuery, PluginManager, PluginRegistration, PluginResult,
};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Implements [`ChatObject`], [`PluginHost`] and plugin cleanup on drop for a
/// struct with `core: ObjectCore` and `ctx: Arc<EngineContext>` fields.
macro_rules! engine_object {
    ($ty:ty) => {
        impl colloquy_core::ChatObject for $ty {
            fn core(&self) -> &colloquy_core::ObjectCore {
                &self.core
            }

            fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
                self
            }
        }

        impl $crate::objects::PluginHost for $ty {
            fn plugin_manager(&self) -> &colloquy_framework::PluginManager {
                &self.ctx.plugins
            }
        }

        impl Drop for $ty {
            fn drop(&mut self) {
                self.ctx.plugins.unregister_all(&*self);
            }
        }
    };
}

mod chat;
mod event;
mod me;
mod search;
mod session;
mod user;

pub use chat::{Chat, EmitOutcome};
pub use event::{Event, EventOutcome};
pub use me::Me;
pub use search::{Search, SearchQuery, SearchStatus};
pub use session::Session;
pub use user::User;

/// Plugin conveniences and teardown shared by every object.
pub trait PluginHost: ChatObject + Sized {
    /// The manager owning this object's plugin registrations.
    fn plugin_manager(&self) -> &PluginManager;

    /// Installs a plugin on this object, replacing one with the same identifier.
    fn register_plugin(self: &Arc<Self>, registration: PluginRegistration) -> PluginResult<()> {
        let object: Arc<dyn ChatObject> = Arc::clone(self) as Arc<dyn ChatObject>;
        self.plugin_manager().register_plugin(&object, registration)
    }

    fn unregister_plugin(&self, identifier: &str) -> PluginResult<()> {
        self.plugin_manager().unregister_plugin(self, identifier)
    }

    fn has_plugin(&self, identifier: &str) -> bool {
        self.plugin_manager().has_plugin(self, identifier)
    }

    /// Installed plugin identifiers, in middleware order.
    fn plugin_identifiers(&self) -> Vec<String> {
        self.plugin_manager().plugin_identifiers(self)
    }

    /// Looks up a plugin extension and downcasts it.
    fn extension<'a, T: Extension>(&self, query: impl Into<ExtensionQuery<'a>>) -> Option<Arc<T>> {
        self.plugin_manager().extension::<T>(self, query)
    }

    /// Invalidates the object, tears down its plugins and drops its handlers.
    ///
    /// Returns `false` when the object was already destructed.
    fn destruct(&self) -> bool {
        if !self.core().invalidate() {
            return false;
        }
        let plugins = self.plugin_manager().unregister_all(self);
        self.emitter().clear();
        debug!(
            object = %self.identifier(),
            object_type = %self.object_type(),
            plugins,
            "Object destructed"
        );
        true
    }
}

pub(crate) fn ensure_valid(object: &dyn ChatObject) -> EngineResult<()> {
    if object.is_valid() {
        Ok(())
    } else {
        Err(EngineError::InvalidObject(object.identifier().to_string()))
    }
}
