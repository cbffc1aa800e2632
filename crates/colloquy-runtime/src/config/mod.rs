//! Configuration module for the Colloquy runtime.
//!
//! This module provides layered (file + environment) configuration loading
//! and validation for the engine, the local user, logging and plugins.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ColloquyConfig, EngineConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
    UserConfig,
};
pub use validation::validate_config;
