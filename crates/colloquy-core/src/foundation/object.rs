//! Identity and validity of SDK objects.
//!
//! Chats, users, searches and the other SDK objects all embed an
//! [`ObjectCore`]: a process-unique [`ObjectId`], a human identifier, the
//! [`ObjectType`], a one-way `valid` flag, and the object's [`EventEmitter`].
//! The [`ChatObject`] trait exposes that core so the framework layer can work
//! with any object through `Arc<dyn ChatObject>`.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use super::emitter::EventEmitter;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one object instance.
///
/// Two objects with the same identifier (e.g. a chat destroyed and recreated
/// under the same name) still have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kinds of SDK objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// A chat room.
    Chat,
    /// A remote user.
    User,
    /// The local user.
    Me,
    /// A history search.
    Search,
    /// The local user's set of joined chats.
    Session,
    /// An in-flight emit tracker.
    Event,
}

impl ObjectType {
    /// Every object type, in declaration order.
    pub const ALL: &'static [ObjectType] = &[
        ObjectType::Chat,
        ObjectType::User,
        ObjectType::Me,
        ObjectType::Search,
        ObjectType::Session,
        ObjectType::Event,
    ];

    /// Returns the lowercase name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::User => "user",
            Self::Me => "me",
            Self::Search => "search",
            Self::Session => "session",
            Self::Event => "event",
        }
    }

    /// Whether type-level ("proto") plugins may target this type.
    pub fn supports_proto_plugins(&self) -> bool {
        matches!(self, Self::Chat | Self::User | Self::Me | Self::Search)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown object type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown object type: '{0}'")]
pub struct UnknownObjectType(pub String);

impl FromStr for ObjectType {
    type Err = UnknownObjectType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "user" => Ok(Self::User),
            "me" => Ok(Self::Me),
            "search" => Ok(Self::Search),
            "session" => Ok(Self::Session),
            "event" => Ok(Self::Event),
            _ => Err(UnknownObjectType(s.to_string())),
        }
    }
}

/// State shared by every SDK object.
pub struct ObjectCore {
    id: ObjectId,
    identifier: String,
    object_type: ObjectType,
    valid: AtomicBool,
    emitter: EventEmitter,
}

impl ObjectCore {
    /// Creates a valid core with a fresh [`ObjectId`].
    pub fn new(object_type: ObjectType, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            id: ObjectId::next(),
            emitter: EventEmitter::new(identifier.clone()),
            identifier,
            object_type,
            valid: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Marks the object invalid.
    ///
    /// Returns `true` only for the call that performed the transition; later
    /// calls return `false`.
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCore")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("object_type", &self.object_type)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Common interface of all SDK objects.
///
/// Implementors only provide [`core`](Self::core) and [`as_any`](Self::as_any);
/// everything else is derived from the core.
pub trait ChatObject: Any + Send + Sync {
    /// Returns the shared object state.
    fn core(&self) -> &ObjectCore;

    /// Returns self as an `Arc<dyn Any>` for downcasting to the concrete type.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn id(&self) -> ObjectId {
        self.core().id()
    }

    fn identifier(&self) -> &str {
        self.core().identifier()
    }

    fn object_type(&self) -> ObjectType {
        self.core().object_type()
    }

    fn is_valid(&self) -> bool {
        self.core().is_valid()
    }

    fn emitter(&self) -> &EventEmitter {
        self.core().emitter()
    }
}

/// A boxed, shared SDK object.
pub type BoxedObject = Arc<dyn ChatObject>;

/// Non-owning reference to an SDK object.
///
/// Held by plugin extensions and middleware; it never keeps the object alive.
#[derive(Clone)]
pub struct ObjectHandle {
    id: ObjectId,
    object_type: ObjectType,
    object: Weak<dyn ChatObject>,
}

impl ObjectHandle {
    /// Creates a handle to `object`.
    pub fn new(object: &Arc<dyn ChatObject>) -> Self {
        Self {
            id: object.id(),
            object_type: object.object_type(),
            object: Arc::downgrade(object),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Returns the object if it is still alive **and** valid.
    pub fn upgrade(&self) -> Option<Arc<dyn ChatObject>> {
        self.object.upgrade().filter(|object| object.is_valid())
    }

    /// Returns `true` when [`upgrade`](Self::upgrade) would succeed.
    pub fn is_live(&self) -> bool {
        self.upgrade().is_some()
    }

    /// Upgrades and downcasts to a concrete object type.
    pub fn downcast<T: ChatObject>(&self) -> Option<Arc<T>> {
        self.upgrade()
            .and_then(|object| Arc::downcast::<T>(object.as_any()).ok())
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("id", &self.id)
            .field("object_type", &self.object_type)
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Room {
        core: ObjectCore,
    }

    impl ChatObject for Room {
        fn core(&self) -> &ObjectCore {
            &self.core
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn room(name: &str) -> Arc<dyn ChatObject> {
        Arc::new(Room {
            core: ObjectCore::new(ObjectType::Chat, name),
        })
    }

    #[test]
    fn test_ids_are_unique() {
        let a = room("lobby");
        let b = room("lobby");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.identifier(), b.identifier());
    }

    #[test]
    fn test_invalidate_flips_once() {
        let object = room("lobby");
        assert!(object.is_valid());
        assert!(object.core().invalidate());
        assert!(!object.core().invalidate());
        assert!(!object.is_valid());
    }

    #[test]
    fn test_handle_is_weak() {
        let object = room("lobby");
        let handle = ObjectHandle::new(&object);
        assert!(handle.is_live());
        assert!(handle.downcast::<Room>().is_some());

        drop(object);
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn test_handle_hides_invalid_objects() {
        let object = room("lobby");
        let handle = ObjectHandle::new(&object);
        object.core().invalidate();
        assert!(!handle.is_live());
    }

    #[test]
    fn test_object_type_parsing() {
        assert_eq!("Chat".parse::<ObjectType>(), Ok(ObjectType::Chat));
        assert_eq!("me".parse::<ObjectType>(), Ok(ObjectType::Me));
        assert!("room".parse::<ObjectType>().is_err());
        assert!(ObjectType::Search.supports_proto_plugins());
        assert!(!ObjectType::Session.supports_proto_plugins());
    }
}
