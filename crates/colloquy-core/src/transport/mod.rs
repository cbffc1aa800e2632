//! The pub/sub network as seen by the SDK.
//!
//! The core never speaks a wire protocol. It expects an injected
//! [`Transport`] exposing a handful of operation shapes (publish, subscribe,
//! history, presence, state) and a stream of [`InboundMessage`]s for the
//! channels it subscribed to.
//!
//! [`memory::MemoryTransport`] is an in-process implementation suitable for
//! tests and demos.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportResult;
use crate::foundation::Payload;

/// Network-assigned ordering token of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timetoken(pub u64);

impl fmt::Display for Timetoken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message delivered by the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel the message was published to.
    pub channel: String,
    /// Published payload, untouched.
    pub payload: Payload,
    /// Ordering token assigned by the network.
    pub timetoken: Timetoken,
    /// Uuid of the publishing client, when the network reports it.
    #[serde(default)]
    pub publisher: Option<String>,
}

/// Which slice of history to fetch.
///
/// History is paged from newest to oldest: a window returns up to `count`
/// messages strictly older than `before` (or the newest messages when
/// `before` is `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub before: Option<Timetoken>,
    pub count: usize,
}

impl HistoryWindow {
    /// The newest `count` messages.
    pub fn latest(count: usize) -> Self {
        Self {
            before: None,
            count,
        }
    }

    /// Up to `count` messages older than `timetoken`.
    pub fn before(timetoken: Timetoken, count: usize) -> Self {
        Self {
            before: Some(timetoken),
            count,
        }
    }
}

/// One page of history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    /// Messages ordered oldest to newest.
    pub messages: Vec<InboundMessage>,
}

impl HistoryPage {
    /// Timetoken of the oldest message, usable as the next window's `before`.
    pub fn oldest(&self) -> Option<Timetoken> {
        self.messages.first().map(|m| m.timetoken)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A client currently present on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub uuid: String,
    #[serde(default)]
    pub state: Option<Payload>,
}

/// Operations the SDK expects from the pub/sub network.
///
/// Implementations must be cheap to share (`Arc<dyn Transport>`); every method
/// takes `&self`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Uuid this client publishes and appears in presence as.
    fn uuid(&self) -> &str;

    /// Publishes `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: Payload) -> TransportResult<Timetoken>;

    /// Starts receiving messages published on `channels`.
    async fn subscribe(&self, channels: &[String]) -> TransportResult<()>;

    /// Stops receiving messages published on `channels`.
    async fn unsubscribe(&self, channels: &[String]) -> TransportResult<()>;

    /// Fetches one page of `channel` history.
    async fn history(&self, channel: &str, window: HistoryWindow) -> TransportResult<HistoryPage>;

    /// Lists the clients present on `channel`.
    async fn presence(&self, channel: &str) -> TransportResult<Vec<Participant>>;

    /// Sets this client's state on `channel`.
    async fn set_state(&self, channel: &str, state: Payload) -> TransportResult<()>;

    /// Reads `uuid`'s state on `channel`.
    async fn get_state(&self, channel: &str, uuid: &str) -> TransportResult<Option<Payload>>;

    /// Hands over the receiving end of the inbound message stream.
    ///
    /// Returns `Some` exactly once; the caller becomes the single consumer.
    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>>;
}

/// A shared transport trait object.
pub type BoxedTransport = Arc<dyn Transport>;
