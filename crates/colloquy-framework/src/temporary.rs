//! Time-bounded retention of fire-and-forget objects.
//!
//! Async operations such as searches and emit trackers are handed back to the
//! caller, who may drop them immediately. [`TemporaryObjects`] holds a strong
//! reference to each such object for a fixed retention window so it can finish
//! emitting its completion events. A background sweeper evicts entries older
//! than the window.
//!
//! ```text
//! store(obj) ──► [obj, inserted_at] ──(age ≥ retention, next sweep)──► dropped
//!      ▲                 │
//!      └─ store(obj) ────┘  resets inserted_at, never duplicates
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default retention window.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Default sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Timing of a [`TemporaryObjects`] store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporaryConfig {
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for TemporaryConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

struct Entry {
    object: Arc<dyn Any + Send + Sync>,
    inserted_at: Instant,
}

/// Keyed by the address of the stored allocation; the strong reference held
/// in the entry keeps that address from being reused.
type EntryKey = usize;

fn key_of<T: ?Sized>(object: &Arc<T>) -> EntryKey {
    Arc::as_ptr(object).cast::<()>() as usize
}

/// Retention store for short-lived async result objects.
pub struct TemporaryObjects {
    config: TemporaryConfig,
    entries: Mutex<HashMap<EntryKey, Entry>>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl TemporaryObjects {
    pub fn new(config: TemporaryConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> TemporaryConfig {
        self.config
    }

    /// Keeps `object` alive for the retention window.
    ///
    /// Storing an object that is already present resets its age. Returns
    /// `true` when a new entry was created.
    pub fn store<T: Any + Send + Sync>(&self, object: &Arc<T>) -> bool {
        if self.cancel.is_cancelled() {
            trace!("Store destroyed, not retaining object");
            return false;
        }

        let key = key_of(object);
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.inserted_at = now;
                false
            }
            None => {
                let object: Arc<dyn Any + Send + Sync> = object.clone();
                entries.insert(
                    key,
                    Entry {
                        object,
                        inserted_at: now,
                    },
                );
                true
            }
        }
    }

    pub fn contains<T: ?Sized>(&self, object: &Arc<T>) -> bool {
        self.entries.lock().contains_key(&key_of(object))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Evicts every entry whose age reached the retention window.
    ///
    /// Returns the number of entries evicted. Evicted objects are dropped
    /// after the lock is released.
    pub fn sweep(&self) -> usize {
        let retention = self.config.retention;
        let now = Instant::now();
        let evicted: Vec<Arc<dyn Any + Send + Sync>> = {
            let mut entries = self.entries.lock();
            let expired: Vec<EntryKey> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.inserted_at) >= retention)
                .map(|(key, _)| *key)
                .collect();
            expired
                .into_iter()
                .filter_map(|key| entries.remove(&key))
                .map(|entry| entry.object)
                .collect()
        };

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted temporary objects");
        }
        evicted.len()
    }

    /// Spawns the periodic sweeper on the current tokio runtime.
    ///
    /// The task stops when the store is destroyed or dropped. Returns `None`
    /// when a sweeper was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }

        let store: Weak<Self> = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let period = self.config.sweep_interval;

        Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        store.sweep();
                    }
                }
            }
            trace!("Temporary object sweeper stopped");
        }))
    }

    /// Stops the sweeper and releases every entry.
    pub fn destroy(&self) {
        self.cancel.cancel();
        let drained: Vec<Entry> = self.entries.lock().drain().map(|(_, entry)| entry).collect();
        debug!(count = drained.len(), "Temporary object store destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for TemporaryObjects {
    fn default() -> Self {
        Self::new(TemporaryConfig::default())
    }
}

impl Drop for TemporaryObjects {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for TemporaryObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryObjects")
            .field("config", &self.config)
            .field("entries", &self.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
