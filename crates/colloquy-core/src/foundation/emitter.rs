//! Local event emitter.
//!
//! Every SDK object owns an [`EventEmitter`]. Handlers are registered against
//! an [`EventPattern`] and invoked synchronously by
//! [`emit_locally`](EventEmitter::emit_locally):
//!
//! ```rust,ignore
//! let emitter = EventEmitter::new("lobby");
//!
//! let id = emitter.on("$.online.*", |event: &EmittedEvent| {
//!     println!("{} -> {}", event.name, event.data);
//! });
//! emitter.once("message", |_: &EmittedEvent| println!("first message"));
//!
//! emitter.emit_locally("$.online.here", json!({ "uuid": "ada" }));
//! emitter.off("$.online.*", id);
//! ```
//!
//! # Ordering
//!
//! Patterns are visited in the order they were first registered, and the
//! handlers of one pattern in registration order (FIFO).
//!
//! # Failures
//!
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers still run.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{error, trace};

use super::Payload;
use super::pattern::EventPattern;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one handler registration; pass it back to `off` / `off_any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// An event as seen by handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    /// Full event name, e.g. `$.online.here`.
    pub name: String,
    /// Structured payload.
    pub data: Payload,
    /// Identifier of the object whose emitter dispatched the event.
    pub emitter: String,
}

/// Return types accepted from handlers.
///
/// Implemented for `()` and for `Result<(), E>` where `E: Display`, so both
/// infallible closures and `?`-style closures can be registered.
pub trait HandlerOutput {
    /// Converts the handler's return value into a uniform result.
    fn into_result(self) -> Result<(), String>;
}

impl HandlerOutput for () {
    fn into_result(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> HandlerOutput for Result<(), E> {
    fn into_result(self) -> Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

type BoxedHandler = Arc<dyn Fn(&EmittedEvent) -> Result<(), String> + Send + Sync>;

struct Registration {
    id: HandlerId,
    handler: BoxedHandler,
    once: bool,
}

struct PatternEntry {
    pattern: EventPattern,
    registrations: Vec<Registration>,
}

/// Per-object registry of event handlers.
///
/// All mutation goes through one internal lock. The lock is **not** held while
/// handlers run, so a handler may register or remove handlers on the same
/// emitter.
pub struct EventEmitter {
    owner: String,
    registry: Mutex<Vec<PatternEntry>>,
}

impl EventEmitter {
    /// Creates an emitter whose events report `owner` as their emitter.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            registry: Mutex::new(Vec::new()),
        }
    }

    /// Identifier of the owning object.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Registers a persistent handler for `pattern`.
    pub fn on<P, F, R>(&self, pattern: P, handler: F) -> HandlerId
    where
        P: Into<EventPattern>,
        F: Fn(&EmittedEvent) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.register(pattern.into(), handler, false)
    }

    /// Registers a handler that is removed after its first invocation.
    pub fn once<P, F, R>(&self, pattern: P, handler: F) -> HandlerId
    where
        P: Into<EventPattern>,
        F: Fn(&EmittedEvent) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.register(pattern.into(), handler, true)
    }

    /// Registers a handler for every event (`*`).
    pub fn on_any<F, R>(&self, handler: F) -> HandlerId
    where
        F: Fn(&EmittedEvent) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.register(EventPattern::any(), handler, false)
    }

    fn register<F, R>(&self, pattern: EventPattern, handler: F, once: bool) -> HandlerId
    where
        F: Fn(&EmittedEvent) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        let id = HandlerId::next();
        let registration = Registration {
            id,
            handler: Arc::new(move |event: &EmittedEvent| handler(event).into_result()),
            once,
        };

        let mut registry = self.registry.lock();
        match registry.iter_mut().find(|entry| entry.pattern == pattern) {
            Some(entry) => entry.registrations.push(registration),
            None => registry.push(PatternEntry {
                pattern,
                registrations: vec![registration],
            }),
        }
        id
    }

    /// Removes one handler from `pattern`.
    ///
    /// Returns `false` when nothing was registered under that id.
    pub fn off(&self, pattern: impl Into<EventPattern>, id: HandlerId) -> bool {
        let pattern = pattern.into();
        let mut registry = self.registry.lock();
        let Some(index) = registry.iter().position(|entry| entry.pattern == pattern) else {
            return false;
        };

        let entry = &mut registry[index];
        let before = entry.registrations.len();
        entry.registrations.retain(|reg| reg.id != id);
        let removed = entry.registrations.len() != before;
        if entry.registrations.is_empty() {
            registry.remove(index);
        }
        removed
    }

    /// Removes a handler previously registered with [`on_any`](Self::on_any).
    pub fn off_any(&self, id: HandlerId) -> bool {
        self.off(EventPattern::any(), id)
    }

    /// Removes every handler registered under exactly `pattern`.
    ///
    /// Wildcards are not expanded: `remove_all_handlers("a.*")` leaves `a.b`
    /// handlers in place. Returns the number of handlers removed.
    pub fn remove_all_handlers(&self, pattern: impl Into<EventPattern>) -> usize {
        let pattern = pattern.into();
        let mut registry = self.registry.lock();
        match registry.iter().position(|entry| entry.pattern == pattern) {
            Some(index) => registry.remove(index).registrations.len(),
            None => 0,
        }
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.registry.lock().clear();
    }

    /// Number of handlers registered under exactly `pattern`.
    pub fn handler_count(&self, pattern: impl Into<EventPattern>) -> usize {
        let pattern = pattern.into();
        self.registry
            .lock()
            .iter()
            .find(|entry| entry.pattern == pattern)
            .map_or(0, |entry| entry.registrations.len())
    }

    /// Total number of handlers across all patterns.
    pub fn total_handlers(&self) -> usize {
        self.registry
            .lock()
            .iter()
            .map(|entry| entry.registrations.len())
            .sum()
    }

    /// Dispatches `event` to every matching handler, in the calling context.
    ///
    /// One-shot handlers are removed while the registry lock is held, before
    /// any handler runs, so they fire exactly once even when a handler fails
    /// or another dispatch races this one.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit_locally(&self, event: &str, payload: Payload) -> usize {
        let handlers: Vec<BoxedHandler> = {
            let mut registry = self.registry.lock();
            let mut selected = Vec::new();
            for entry in registry.iter_mut() {
                if !entry.pattern.matches(event) {
                    continue;
                }
                entry.registrations.retain(|reg| {
                    selected.push(Arc::clone(&reg.handler));
                    !reg.once
                });
            }
            registry.retain(|entry| !entry.registrations.is_empty());
            selected
        };

        if handlers.is_empty() {
            trace!(emitter = %self.owner, event, "No handlers for event");
            return 0;
        }

        let emitted = EmittedEvent {
            name: event.to_string(),
            data: payload,
            emitter: self.owner.clone(),
        };

        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&emitted))) {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    error!(
                        emitter = %self.owner,
                        event,
                        error = %message,
                        "Event handler returned an error"
                    );
                }
                Err(panic) => {
                    error!(
                        emitter = %self.owner,
                        event,
                        panic = %panic_message(panic.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }

        handlers.len()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("owner", &self.owner)
            .field("handlers", &self.total_handlers())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
