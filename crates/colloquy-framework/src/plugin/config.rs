//! Registration requests and per-registration configuration.
//!
//! A [`PluginRegistration`] pairs a descriptor with the identifier and
//! configuration it is installed under:
//!
//! ```rust,ignore
//! let registration = PluginRegistration::new(&PROFANITY)
//!     .identifier("strict-filter")
//!     .configuration(json!({
//!         "banned": ["darn"],
//!         "events": { "emit": ["message", "reaction.*"] },
//!     }))
//!     .insert_first();
//! ```
//!
//! The configuration must be a JSON object. Its optional `events` key
//! replaces the default event patterns of the plugin's middlewares for this
//! registration only:
//!
//! | Key | Applies to |
//! |-----|-----------|
//! | `events.emit` | middlewares at [`Location::Emit`] |
//! | `events.on` | middlewares at [`Location::On`] |

use serde_json::Value;

use colloquy_core::EventPattern;

use super::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::pipeline::Location;

const EVENTS_KEY: &str = "events";

/// A request to install a plugin on an object or object type.
#[derive(Debug, Clone)]
pub struct PluginRegistration {
    descriptor: PluginDescriptor,
    identifier: Option<String>,
    configuration: Option<Value>,
    insert_first: bool,
}

impl PluginRegistration {
    pub fn new(descriptor: &PluginDescriptor) -> Self {
        Self {
            descriptor: *descriptor,
            identifier: None,
            configuration: None,
            insert_first: false,
        }
    }

    /// Registers under `identifier` instead of the descriptor name.
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Sets the configuration map handed to the plugin's factories.
    pub fn configuration(mut self, configuration: Value) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Places the plugin before every plugin already on the object, so its
    /// middlewares run first.
    pub fn insert_first(mut self) -> Self {
        self.insert_first = true;
        self
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// The effective identifier.
    pub fn plugin_identifier(&self) -> &str {
        self.identifier.as_deref().unwrap_or(self.descriptor.name)
    }

    pub fn explicit_configuration(&self) -> Option<&Value> {
        self.configuration.as_ref()
    }

    pub fn is_insert_first(&self) -> bool {
        self.insert_first
    }
}

// ─── Middleware event overrides ──────────────────────────────────────────────

/// Event patterns taken from a configuration's `events` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EventOverrides {
    emit: Option<Vec<EventPattern>>,
    on: Option<Vec<EventPattern>>,
}

impl EventOverrides {
    /// Validates `configuration` and extracts its overrides.
    ///
    /// `configuration` must be `Null` or an object; `events`, when present,
    /// must be an object whose `emit` / `on` entries are arrays of valid
    /// patterns.
    pub(crate) fn parse(plugin: &str, configuration: &Value) -> PluginResult<Self> {
        let map = match configuration {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(PluginError::invalid_configuration(
                    plugin,
                    format!("expected a key/value map, found {}", json_kind(other)),
                ));
            }
        };

        let Some(events) = map.get(EVENTS_KEY) else {
            return Ok(Self::default());
        };
        let Value::Object(events) = events else {
            return Err(PluginError::invalid_configuration(
                plugin,
                "`events` must be a map with `emit` and/or `on` lists",
            ));
        };

        let mut overrides = Self::default();
        for (key, value) in events {
            let location: Location = key.parse().map_err(|_| {
                PluginError::invalid_configuration(
                    plugin,
                    format!("unknown pipeline location '{key}' in `events`"),
                )
            })?;
            let patterns = parse_patterns(plugin, key, value)?;
            match location {
                Location::Emit => overrides.emit = Some(patterns),
                Location::On => overrides.on = Some(patterns),
            }
        }
        Ok(overrides)
    }

    /// Patterns for `location`, falling back to `defaults`.
    pub(crate) fn patterns_for(&self, location: Location, defaults: &[&str]) -> Vec<EventPattern> {
        let overridden = match location {
            Location::Emit => self.emit.as_ref(),
            Location::On => self.on.as_ref(),
        };
        match overridden {
            Some(patterns) => patterns.clone(),
            None => defaults.iter().copied().map(EventPattern::new).collect(),
        }
    }
}

fn parse_patterns(plugin: &str, key: &str, value: &Value) -> PluginResult<Vec<EventPattern>> {
    let Value::Array(items) = value else {
        return Err(PluginError::invalid_configuration(
            plugin,
            format!("`events.{key}` must be a list of event patterns"),
        ));
    };

    items
        .iter()
        .map(|item| {
            let pattern = item.as_str().map(EventPattern::new).filter(EventPattern::is_valid);
            pattern.ok_or_else(|| {
                PluginError::invalid_configuration(
                    plugin,
                    format!("`events.{key}` contains an invalid pattern: {item}"),
                )
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_and_plain_maps_have_no_overrides() {
        assert_eq!(
            EventOverrides::parse("p", &Value::Null).unwrap(),
            EventOverrides::default()
        );
        assert_eq!(
            EventOverrides::parse("p", &json!({ "banned": ["x"] })).unwrap(),
            EventOverrides::default()
        );
    }

    #[test]
    fn test_non_map_configuration_is_rejected() {
        let err = EventOverrides::parse("p", &json!(["a"])).unwrap_err();
        assert!(matches!(err, PluginError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("a list"));
    }

    #[test]
    fn test_overrides_replace_defaults_per_location() {
        let overrides =
            EventOverrides::parse("p", &json!({ "events": { "emit": ["message", "a.*"] } }))
                .unwrap();

        let emit: Vec<_> = overrides
            .patterns_for(Location::Emit, &["custom"])
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(emit, vec!["message", "a.*"]);

        let on = overrides.patterns_for(Location::On, &["custom"]);
        assert_eq!(on, vec![EventPattern::new("custom")]);
    }

    #[test]
    fn test_malformed_events_are_rejected() {
        for config in [
            json!({ "events": ["message"] }),
            json!({ "events": { "emit": "message" } }),
            json!({ "events": { "emit": ["a..b"] } }),
            json!({ "events": { "emit": [1] } }),
            json!({ "events": { "publish": ["message"] } }),
        ] {
            assert!(
                EventOverrides::parse("p", &config).is_err(),
                "accepted {config}"
            );
        }
    }

    #[test]
    fn test_identifier_defaults_to_descriptor_name() {
        let registration = PluginRegistration::new(&crate::plugin::tests::EMPTY);
        assert_eq!(registration.plugin_identifier(), "empty");
        let registration = registration.identifier("other").insert_first();
        assert_eq!(registration.plugin_identifier(), "other");
        assert!(registration.is_insert_first());
    }
}
