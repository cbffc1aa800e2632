//! # Colloquy Core
//!
//! Foundation types shared by every layer of the Colloquy chat SDK:
//!
//! - [`EventPattern`] — dotted event names with trailing `*` wildcards
//! - [`EventEmitter`] — per-object handler registry with local dispatch
//! - [`ChatObject`] / [`ObjectCore`] — identity and validity of SDK objects
//! - [`Transport`] — the operation shapes expected from the pub/sub network
//!
//! The framework layer (plugins, middleware, temporary objects) and the
//! runtime layer (engine, chats, users) are built on top of these types.

pub mod error;
pub mod foundation;
pub mod transport;

pub use error::{TransportError, TransportResult};
pub use foundation::emitter::{EmittedEvent, EventEmitter, HandlerId, HandlerOutput};
pub use foundation::object::{
    BoxedObject, ChatObject, ObjectCore, ObjectHandle, ObjectId, ObjectType, UnknownObjectType,
};
pub use foundation::pattern::EventPattern;
pub use foundation::Payload;
pub use transport::memory::{MemoryNetwork, MemoryTransport};
pub use transport::{
    BoxedTransport, HistoryPage, HistoryWindow, InboundMessage, Participant, Timetoken, Transport,
};
