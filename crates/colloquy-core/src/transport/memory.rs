//! In-process pub/sub network.
//!
//! A [`MemoryNetwork`] plays the role of the remote service; each
//! [`MemoryTransport`] is one client attached to it.
//!
//! ```rust,ignore
//! let network = MemoryNetwork::new();
//! let ada = network.client("ada");
//! let bob = network.client("bob");
//!
//! bob.subscribe(&["lobby".into()]).await?;
//! ada.publish("lobby", json!("hello")).await?;
//! let msg = bob.take_inbound().unwrap().recv().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{HistoryPage, HistoryWindow, InboundMessage, Participant, Timetoken, Transport};
use crate::error::{TransportError, TransportResult};
use crate::foundation::Payload;

#[derive(Default)]
struct ChannelState {
    history: Vec<InboundMessage>,
    /// Subscribed client uuids, in subscription order.
    subscribers: Vec<String>,
    states: HashMap<String, Payload>,
}

#[derive(Default)]
struct NetworkState {
    last_timetoken: u64,
    channels: HashMap<String, ChannelState>,
    clients: HashMap<String, mpsc::UnboundedSender<InboundMessage>>,
}

/// Shared in-memory network. Cloning yields another handle to the same network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new client. A second client with the same uuid replaces the
    /// first one's inbound stream.
    pub fn client(&self, uuid: impl Into<String>) -> MemoryTransport {
        let uuid = uuid.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().clients.insert(uuid.clone(), tx);
        debug!(uuid = %uuid, "Memory client attached");
        MemoryTransport {
            uuid,
            network: self.clone(),
            inbound: Mutex::new(Some(rx)),
            connected: AtomicBool::new(true),
        }
    }

    /// Number of messages stored for `channel`.
    pub fn history_len(&self, channel: &str) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map_or(0, |c| c.history.len())
    }

    /// Uuids subscribed to `channel`.
    pub fn subscribers(&self, channel: &str) -> Vec<String> {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|c| c.subscribers.clone())
            .unwrap_or_default()
    }
}

/// One client of a [`MemoryNetwork`].
pub struct MemoryTransport {
    uuid: String,
    network: MemoryNetwork,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// Simulates losing the connection: every later operation fails with
    /// [`TransportError::NotConnected`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Restores a connection dropped by [`disconnect`](Self::disconnect).
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::Release);
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    async fn publish(&self, channel: &str, payload: Payload) -> TransportResult<Timetoken> {
        self.ensure_connected()?;
        let mut state = self.network.state.lock();
        state.last_timetoken += 1;
        let message = InboundMessage {
            channel: channel.to_string(),
            payload,
            timetoken: Timetoken(state.last_timetoken),
            publisher: Some(self.uuid.clone()),
        };

        let NetworkState {
            channels, clients, ..
        } = &mut *state;
        let entry = channels.entry(channel.to_string()).or_default();
        entry.history.push(message.clone());
        for subscriber in &entry.subscribers {
            if let Some(tx) = clients.get(subscriber)
                && tx.send(message.clone()).is_err()
            {
                trace!(subscriber = %subscriber, "Dropped message for closed client");
            }
        }

        Ok(message.timetoken)
    }

    async fn subscribe(&self, channels: &[String]) -> TransportResult<()> {
        self.ensure_connected()?;
        let mut state = self.network.state.lock();
        for channel in channels {
            let entry = state.channels.entry(channel.clone()).or_default();
            if !entry.subscribers.contains(&self.uuid) {
                entry.subscribers.push(self.uuid.clone());
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[String]) -> TransportResult<()> {
        self.ensure_connected()?;
        let mut state = self.network.state.lock();
        for channel in channels {
            if let Some(entry) = state.channels.get_mut(channel) {
                entry.subscribers.retain(|uuid| uuid != &self.uuid);
                entry.states.remove(&self.uuid);
            }
        }
        Ok(())
    }

    async fn history(&self, channel: &str, window: HistoryWindow) -> TransportResult<HistoryPage> {
        self.ensure_connected()?;
        let state = self.network.state.lock();
        let Some(entry) = state.channels.get(channel) else {
            return Ok(HistoryPage::default());
        };

        let eligible: Vec<&InboundMessage> = entry
            .history
            .iter()
            .filter(|m| window.before.is_none_or(|before| m.timetoken < before))
            .collect();
        let skip = eligible.len().saturating_sub(window.count);
        Ok(HistoryPage {
            messages: eligible.into_iter().skip(skip).cloned().collect(),
        })
    }

    async fn presence(&self, channel: &str) -> TransportResult<Vec<Participant>> {
        self.ensure_connected()?;
        let state = self.network.state.lock();
        Ok(state
            .channels
            .get(channel)
            .map(|entry| {
                entry
                    .subscribers
                    .iter()
                    .map(|uuid| Participant {
                        uuid: uuid.clone(),
                        state: entry.states.get(uuid).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_state(&self, channel: &str, state: Payload) -> TransportResult<()> {
        self.ensure_connected()?;
        self.network
            .state
            .lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .states
            .insert(self.uuid.clone(), state);
        Ok(())
    }

    async fn get_state(&self, channel: &str, uuid: &str) -> TransportResult<Option<Payload>> {
        self.ensure_connected()?;
        Ok(self
            .network
            .state
            .lock()
            .channels
            .get(channel)
            .and_then(|entry| entry.states.get(uuid).cloned()))
    }

    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        self.inbound.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_subscribers_only() {
        let network = MemoryNetwork::new();
        let ada = network.client("ada");
        let bob = network.client("bob");
        let eve = network.client("eve");

        bob.subscribe(&["lobby".to_string()]).await.unwrap();
        let tt = ada.publish("lobby", json!({ "text": "hi" })).await.unwrap();

        let mut bob_rx = bob.take_inbound().unwrap();
        let received = bob_rx.recv().await.unwrap();
        assert_eq!(received.timetoken, tt);
        assert_eq!(received.publisher.as_deref(), Some("ada"));

        let mut eve_rx = eve.take_inbound().unwrap();
        assert!(eve_rx.try_recv().is_err());
        assert!(bob.take_inbound().is_none());
    }

    #[tokio::test]
    async fn test_history_pages_backwards() {
        let network = MemoryNetwork::new();
        let ada = network.client("ada");
        for i in 0..5 {
            ada.publish("lobby", json!(i)).await.unwrap();
        }

        let page = ada.history("lobby", HistoryWindow::latest(2)).await.unwrap();
        let values: Vec<_> = page.messages.iter().map(|m| m.payload.clone()).collect();
        assert_eq!(values, vec![json!(3), json!(4)]);

        let older = ada
            .history("lobby", HistoryWindow::before(page.oldest().unwrap(), 10))
            .await
            .unwrap();
        assert_eq!(older.messages.len(), 3);
        assert_eq!(older.messages[0].payload, json!(0));
    }

    #[tokio::test]
    async fn test_presence_and_state() {
        let network = MemoryNetwork::new();
        let ada = network.client("ada");
        ada.subscribe(&["lobby".to_string()]).await.unwrap();
        ada.set_state("lobby", json!({ "mood": "happy" })).await.unwrap();

        let present = ada.presence("lobby").await.unwrap();
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].state, Some(json!({ "mood": "happy" })));

        let state = ada.get_state("lobby", "ada").await.unwrap();
        assert_eq!(state, Some(json!({ "mood": "happy" })));

        ada.unsubscribe(&["lobby".to_string()]).await.unwrap();
        assert!(ada.presence("lobby").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_client_fails() {
        let network = MemoryNetwork::new();
        let ada = network.client("ada");
        ada.disconnect();
        assert!(matches!(
            ada.publish("lobby", json!(1)).await,
            Err(TransportError::NotConnected)
        ));
        ada.reconnect();
        assert!(ada.publish("lobby", json!(1)).await.is_ok());
    }
}
