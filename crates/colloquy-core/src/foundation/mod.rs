//! Building blocks every SDK object is composed from.

pub mod emitter;
pub mod object;
pub mod pattern;

/// Structured payload carried by events, middleware and the transport.
pub type Payload = serde_json::Value;
