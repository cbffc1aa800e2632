// ─── Internal helper: PluginMetadata builder ──────────────────────────────────
//
// Used exclusively by `define_plugin!`.  Not part of the public API.

/// Internal helper macro: builds a [`PluginMetadata`] from optional overrides.
///
/// # Internal calling convention
///
/// ```text
/// __plugin_metadata!(
///     @parse [$doc?]      ← captured doc literal
///            key: val, …  ← raw metadata tokens
/// )
/// ```
///
/// [`PluginMetadata`]: crate::plugin::PluginMetadata
#[macro_export]
#[doc(hidden)]
macro_rules! __plugin_metadata {
    // Entry: receives doc comment and raw metadata tokens
    (@parse [$($doc:expr)?] $($meta:tt)*) => {
        $crate::__plugin_metadata!(
            @pm [$($doc)?] [] [] []
            :: $($meta)*
        )
    };

    // TT-muncher: skip leading comma
    (@pm $doc:tt $ver:tt $dsc:tt $fd:tt
        :: , $($rest:tt)*
    ) => {
        $crate::__plugin_metadata!(@pm $doc $ver $dsc $fd :: $($rest)*)
    };

    // version: "..."
    (@pm $doc:tt [$($old:expr)?] $dsc:tt $fd:tt
        :: version : $v:literal $($rest:tt)*
    ) => {
        $crate::__plugin_metadata!(@pm $doc [$v] $dsc $fd :: $($rest)*)
    };

    // desc: "..."
    (@pm $doc:tt $ver:tt [$($old:expr)?] $fd:tt
        :: desc : $v:literal $($rest:tt)*
    ) => {
        $crate::__plugin_metadata!(@pm $doc $ver [$v] $fd :: $($rest)*)
    };

    // full_desc: "..."
    (@pm $doc:tt $ver:tt $dsc:tt [$($old:expr)?]
        :: full_desc : $v:literal $($rest:tt)*
    ) => {
        $crate::__plugin_metadata!(@pm $doc $ver $dsc [$v] :: $($rest)*)
    };

    // Skip unknown ident:value pairs
    (@pm $doc:tt $ver:tt $dsc:tt $fd:tt
        :: $ident:ident : $value:tt $($rest:tt)*
    ) => {
        $crate::__plugin_metadata!(@pm $doc $ver $dsc $fd :: $($rest)*)
    };

    // End of tokens → emit
    (@pm $doc:tt $ver:tt $dsc:tt $fd:tt ::) => {
        $crate::plugin::PluginMetadata {
            version:   $crate::__plugin_metadata!(@get_ver $ver),
            desc:      $crate::__plugin_metadata!(@get_dsc $dsc),
            full_desc: $crate::__plugin_metadata!(@get_fd $fd $doc),
        }
    };

    (@get_ver []) => { ::std::env!("CARGO_PKG_VERSION") };
    (@get_ver [$ver:expr]) => { $ver };

    (@get_dsc []) => { ::std::env!("CARGO_PKG_DESCRIPTION") };
    (@get_dsc [$dsc:expr]) => { $dsc };

    // explicit > doc > None
    (@get_fd [$fd:expr] $_doc:tt) => { ::std::option::Option::Some($fd) };
    (@get_fd [] [$doc:expr]) => { ::std::option::Option::Some($doc) };
    (@get_fd [] []) => { ::std::option::Option::None };
}

// ─── define_plugin! ──────────────────────────────────────────────────────────

/// Creates a [`PluginDescriptor`]: the static, `Copy` handle to a plugin.
///
/// # Syntax
///
/// ```rust,ignore
/// use colloquy::prelude::*;
///
/// /// Drops messages containing banned words.
/// pub static PROFANITY: PluginDescriptor = define_plugin! {
///     name: "profanity",
///
///     // Per-object capability; the first matching entry wins.
///     extension: { types: [Chat], create: FilterStats::create },
///
///     // One middleware per entry; repeat for several locations.
///     middleware: {
///         location: Emit,
///         types: [Chat],
///         events: ["message"],
///         create: ProfanityFilter::create,
///     },
///
///     metadata: {
///         version: "2.0.0",
///         desc:    "Short description.",
///     },
/// };
/// ```
///
/// ## Field reference
///
/// | Field | Required | Description |
/// |-------|----------|-------------|
/// | `name` | ✓ | Must be **first**. Default identifier and config-section key. |
/// | `extension` | — | `{ types: [ObjectType, …], create: path }`, repeatable |
/// | `middleware` | — | `{ location: Emit \| On, types: [...], events: ["pattern", …], create: path }`, repeatable |
/// | `metadata` | — | `{ version, desc, full_desc }`, must be **last** |
///
/// `create` paths are plain functions matching
/// [`ExtensionFactory`](crate::plugin::ExtensionFactory) or
/// [`MiddlewareFactory`](crate::plugin::MiddlewareFactory).
///
/// [`PluginDescriptor`]: crate::plugin::PluginDescriptor
#[macro_export]
macro_rules! define_plugin {
    // ── Entry: with doc comment ───────────────────────────────────────────────
    //
    // Accumulator slots:
    //   [$n]        plugin name literal
    //   [$($ext)*]  one `{ [types] create }` group per extension
    //   [$($mw)*]   one `{ location [types] [events] create }` group per middleware
    //   [$($doc)?]  doc literal
    ($(#[doc = $doc:literal])+ name: $name:literal $(, $($tail:tt)*)?) => {
        $crate::define_plugin!(
            @acc [$name] [] [] [::std::concat!($($doc, " "),*)]
            $($($tail)*)?
        )
    };

    // ── Entry: no doc ─────────────────────────────────────────────────────────
    (name: $name:literal $(, $($tail:tt)*)?) => {
        $crate::define_plugin!(
            @acc [$name] [] [] []
            $($($tail)*)?
        )
    };

    // ── Accumulator: skip stray commas ────────────────────────────────────────
    (@acc $n:tt $ext:tt $mw:tt $doc:tt , $($rest:tt)*) => {
        $crate::define_plugin!(@acc $n $ext $mw $doc $($rest)*)
    };

    // ── Consume extension: { types: [..], create: path } ─────────────────────
    (
        @acc $n:tt [$($ext:tt)*] $mw:tt $doc:tt
        extension: {
            types: [$($ty:ident),* $(,)?],
            create: $create:path $(,)?
        } $($rest:tt)*
    ) => {
        $crate::define_plugin!(
            @acc $n [$($ext)* { [$($ty),*] $create }] $mw $doc
            $($rest)*
        )
    };

    // ── Consume middleware: { location, types, events, create } ──────────────
    (
        @acc $n:tt $ext:tt [$($mw:tt)*] $doc:tt
        middleware: {
            location: $loc:ident,
            types: [$($ty:ident),* $(,)?],
            events: [$($ev:literal),* $(,)?],
            create: $create:path $(,)?
        } $($rest:tt)*
    ) => {
        $crate::define_plugin!(
            @acc $n $ext [$($mw)* { $loc [$($ty),*] [$($ev),*] $create }] $doc
            $($rest)*
        )
    };

    // ── Consume metadata: { … } (last field) ─────────────────────────────────
    (@acc $n:tt $ext:tt $mw:tt $doc:tt metadata: { $($meta:tt)* } $(,)?) => {
        $crate::define_plugin!(@terminal $n $ext $mw $doc $($meta)*)
    };

    // ── No remaining fields → terminal ────────────────────────────────────────
    (@acc $n:tt $ext:tt $mw:tt $doc:tt) => {
        $crate::define_plugin!(@terminal $n $ext $mw $doc)
    };

    // ── @terminal — emit the PluginDescriptor ─────────────────────────────────
    (
        @terminal [$n:literal]
            [$({ [$($ety:ident),*] $ecreate:path })*]
            [$({ $loc:ident [$($mty:ident),*] [$($ev:literal),*] $mcreate:path })*]
            [$($doc:expr)?] $($meta:tt)*
    ) => {
        $crate::plugin::PluginDescriptor {
            api_version: $crate::plugin::COLLOQUY_PLUGIN_API_VERSION,
            name: $n,
            extensions: &[$(
                $crate::plugin::ExtensionEntry {
                    object_types: &[$($crate::plugin::__ObjectType::$ety),*],
                    create: $ecreate,
                }
            ),*],
            middlewares: &[$(
                $crate::plugin::MiddlewareEntry {
                    location: $crate::pipeline::Location::$loc,
                    object_types: &[$($crate::plugin::__ObjectType::$mty),*],
                    events: &[$($ev),*],
                    create: $mcreate,
                }
            ),*],
            metadata: $crate::__plugin_metadata!(@parse [$($doc)?] $($meta)*),
        }
    };
}
