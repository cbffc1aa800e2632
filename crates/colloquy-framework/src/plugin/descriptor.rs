//! Plugin descriptor: the static, `Copy` handle to a plugin.

use colloquy_core::ObjectType;

use super::core::{ExtensionFactory, MiddlewareFactory, PluginMetadata};
use crate::pipeline::Location;

// ─── API versioning ──────────────────────────────────────────────────────────

/// Current Colloquy plugin API version (1.0).
pub const COLLOQUY_PLUGIN_API_VERSION: u32 = 0x0001_0000;

// ─── Capability entries ──────────────────────────────────────────────────────

/// Declares that a plugin provides an extension for some object types.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionEntry {
    pub object_types: &'static [ObjectType],
    pub create: ExtensionFactory,
}

/// Declares a middleware for one pipeline location.
#[derive(Debug, Clone, Copy)]
pub struct MiddlewareEntry {
    pub location: Location,
    pub object_types: &'static [ObjectType],
    /// Default event patterns; a registration's configuration may override them.
    pub events: &'static [&'static str],
    pub create: MiddlewareFactory,
}

// ─── PluginDescriptor ────────────────────────────────────────────────────────

/// A static, `Copy` descriptor that identifies a plugin and the capabilities
/// it provides per object type.
///
/// Use the [`define_plugin!`](crate::define_plugin) macro to create one.
#[derive(Debug, Clone, Copy)]
pub struct PluginDescriptor {
    /// Plugin API version this descriptor was compiled against.
    pub api_version: u32,

    /// Plugin name. Default registration identifier and config lookup key.
    pub name: &'static str,

    pub extensions: &'static [ExtensionEntry],

    pub middlewares: &'static [MiddlewareEntry],

    pub metadata: PluginMetadata,
}

impl PluginDescriptor {
    /// Returns `true` if this descriptor's API version is compatible with the
    /// running framework.
    ///
    /// The major part must match exactly; the descriptor's minor part must be
    /// ≤ the host's minor part.
    pub fn is_compatible(&self) -> bool {
        let host_major = COLLOQUY_PLUGIN_API_VERSION >> 16;
        let desc_major = self.api_version >> 16;
        let desc_minor = self.api_version & 0xFFFF;
        let host_minor = COLLOQUY_PLUGIN_API_VERSION & 0xFFFF;
        desc_major == host_major && desc_minor <= host_minor
    }

    /// The extension entry used for `object_type`: the first one listing it.
    pub fn extension_for(&self, object_type: ObjectType) -> Option<&'static ExtensionEntry> {
        self.extensions
            .iter()
            .find(|entry| entry.object_types.contains(&object_type))
    }

    /// Middleware entries that apply to `object_type`, in declaration order.
    pub fn middlewares_for(
        &self,
        object_type: ObjectType,
    ) -> impl Iterator<Item = &'static MiddlewareEntry> {
        self.middlewares
            .iter()
            .filter(move |entry| entry.object_types.contains(&object_type))
    }

    /// Returns `true` when the plugin contributes anything to `object_type`.
    pub fn supports(&self, object_type: ObjectType) -> bool {
        self.extension_for(object_type).is_some()
            || self.middlewares_for(object_type).next().is_some()
    }

    #[inline]
    pub fn metadata(&self) -> PluginMetadata {
        self.metadata
    }
}

pub(crate) fn format_api_version(version: u32) -> String {
    format!("{}.{}", version >> 16, version & 0xFFFF)
}
