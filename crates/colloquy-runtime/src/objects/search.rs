use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colloquy_core::{
    ChatObject, EventPattern, HistoryWindow, InboundMessage, ObjectCore, ObjectType, Payload,
};
use colloquy_framework::{Location, PipelineOutcome};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::envelope::Envelope;
use crate::error::EngineResult;

/// What to look for in a chat's history.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Only events matching this pattern.
    pub event: Option<EventPattern>,
    /// Only events published by this uuid.
    pub sender: Option<String>,
    /// Stop after this many hits.
    pub limit: usize,
    /// Stop after this many history pages.
    pub pages: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            event: None,
            sender: None,
            limit: 20,
            pages: 10,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, pattern: impl Into<EventPattern>) -> Self {
        self.event = Some(pattern.into());
        self
    }

    pub fn sender(mut self, uuid: impl Into<String>) -> Self {
        self.sender = Some(uuid.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    fn accepts(&self, envelope: &Envelope) -> bool {
        self.event
            .as_ref()
            .is_none_or(|pattern| pattern.matches(&envelope.event))
            && self
                .sender
                .as_deref()
                .is_none_or(|sender| sender == envelope.sender)
    }
}

/// Progress of a [`Search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Pending,
    Running,
    Finished { found: usize },
    Failed { error: String },
}

impl SearchStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }
}

/// A walk through a chat's history, newest to oldest.
///
/// Every hit passes the search's own `On` middlewares and is then emitted
/// under its event name. The walk is bracketed by `$.search.start` and
/// `$.search.finish`; a transport failure emits `$.error.search` instead of
/// the finish event.
pub struct Search {
    core: ObjectCore,
    ctx: Arc<EngineContext>,
    chat: String,
    query: SearchQuery,
    started: AtomicBool,
    results: Mutex<Vec<Payload>>,
    status: watch::Sender<SearchStatus>,
}

engine_object!(Search);

impl Search {
    pub(crate) fn new(ctx: Arc<EngineContext>, chat: &str, query: SearchQuery) -> Self {
        let (status, _) = watch::channel(SearchStatus::Pending);
        Self {
            core: ObjectCore::new(ObjectType::Search, format!("{chat}#search")),
            ctx,
            chat: chat.to_string(),
            query,
            started: AtomicBool::new(false),
            results: Mutex::new(Vec::new()),
            status,
        }
    }

    /// Channel of the searched chat.
    pub fn chat(&self) -> &str {
        &self.chat
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn status(&self) -> SearchStatus {
        self.status.borrow().clone()
    }

    /// Delivered hits so far, newest first.
    pub fn results(&self) -> Vec<Payload> {
        self.results.lock().clone()
    }

    /// Starts paging in the background. Returns `false` if already started.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            return false;
        }
        let search = Arc::clone(self);
        tokio::spawn(async move { search.run().await });
        true
    }

    /// Starts the search if needed and waits for it to end.
    pub async fn finished(self: &Arc<Self>) -> SearchStatus {
        self.start();
        let mut rx = self.status.subscribe();
        match rx.wait_for(SearchStatus::is_done).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }

    async fn run(&self) {
        self.status.send_replace(SearchStatus::Running);
        self.emitter().emit_locally(
            "$.search.start",
            json!({
                "chat": self.chat,
                "event": self.query.event.as_ref().map(EventPattern::as_str),
                "sender": self.query.sender,
                "limit": self.query.limit,
            }),
        );

        match self.page_through().await {
            Ok(found) => {
                debug!(chat = %self.chat, found, "Search finished");
                self.status.send_replace(SearchStatus::Finished { found });
                self.emitter()
                    .emit_locally("$.search.finish", json!({ "chat": self.chat, "found": found }));
            }
            Err(e) => {
                let error = e.to_string();
                warn!(chat = %self.chat, error = %error, "Search failed");
                self.status.send_replace(SearchStatus::Failed {
                    error: error.clone(),
                });
                self.emitter()
                    .emit_locally("$.error.search", json!({ "chat": self.chat, "error": error }));
            }
        }
    }

    async fn page_through(&self) -> EngineResult<usize> {
        let page_size = self.ctx.config.history_page_size;
        let mut found = 0;
        let mut before = None;

        for _ in 0..self.query.pages {
            if found >= self.query.limit || !self.is_valid() {
                break;
            }

            let window = HistoryWindow {
                before,
                count: page_size,
            };
            let page = self.ctx.transport.history(&self.chat, window).await?;

            for message in page.messages.iter().rev() {
                if found >= self.query.limit {
                    break;
                }
                if self.deliver(message).await {
                    found += 1;
                }
            }

            if page.messages.len() < page_size {
                break;
            }
            before = page.oldest();
        }

        Ok(found)
    }

    async fn deliver(&self, message: &InboundMessage) -> bool {
        let envelope = match Envelope::from_payload(message.payload.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(chat = %self.chat, timetoken = %message.timetoken, error = %e, "Skipping malformed history entry");
                return false;
            }
        };
        if !self.query.accepts(&envelope) {
            return false;
        }

        let event = envelope.event.clone();
        let Ok(payload) = envelope.delivered(message.timetoken) else {
            return false;
        };

        match self
            .ctx
            .plugins
            .run_middlewares(Location::On, &event, self, payload)
            .await
        {
            PipelineOutcome::Delivered(payload) => {
                self.results.lock().push(payload.clone());
                self.emitter().emit_locally(&event, payload);
                true
            }
            PipelineOutcome::Rejected { plugin } => {
                debug!(chat = %self.chat, event = %event, plugin = %plugin, "Search hit rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use colloquy_core::{EmittedEvent, MemoryNetwork};
    use colloquy_framework::{
        BoxError, Middleware, MiddlewareFlow, PluginContext, PluginDescriptor,
        PluginRegistration, define_plugin,
    };

    use super::*;
    use crate::ChatEngine;
    use crate::config::ColloquyConfig;
    use crate::engine::test_engine;
    use crate::objects::PluginHost;

    /// Lets through messages whose `n` is even.
    struct EvenOnly;

    #[async_trait]
    impl Middleware for EvenOnly {
        async fn run(&self, _event: &str, payload: &mut Payload) -> MiddlewareFlow {
            match payload["data"]["n"].as_u64() {
                Some(n) if n % 2 == 0 => MiddlewareFlow::Continue,
                _ => MiddlewareFlow::Reject,
            }
        }
    }

    fn create_even_only(_: &PluginContext) -> Result<Arc<dyn Middleware>, BoxError> {
        Ok(Arc::new(EvenOnly))
    }

    static EVEN_ONLY: PluginDescriptor = define_plugin! {
        name: "even-only",
        middleware: { location: On, types: [Search], events: ["message"], create: create_even_only },
    };

    fn record(search: &Search) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        search.emitter().on_any(move |event: &EmittedEvent| {
            sink.lock().push(event.name.clone());
        });
        seen
    }

    #[tokio::test]
    async fn test_search_filters_newest_first() {
        let network = MemoryNetwork::new();
        let ada = test_engine(&network, "ada");
        let bob = test_engine(&network, "bob");
        let ada_lobby = ada.chat("lobby").unwrap();
        let bob_lobby = bob.chat("lobby").unwrap();
        for n in 0..5 {
            ada_lobby.publish("message", json!({ "n": n })).await.unwrap();
            bob_lobby.publish("message", json!({ "n": n })).await.unwrap();
        }
        bob_lobby.publish("typing", json!({})).await.unwrap();

        let search = ada_lobby
            .search(SearchQuery::new().event("message").sender("bob").limit(3))
            .unwrap();
        assert_eq!(search.status(), SearchStatus::Pending);
        assert!(ada.temporaries().contains(&search));
        let seen = record(&search);

        assert_eq!(search.finished().await, SearchStatus::Finished { found: 3 });

        let numbers: Vec<Payload> = search
            .results()
            .iter()
            .map(|hit| hit["data"]["n"].clone())
            .collect();
        assert_eq!(numbers, vec![json!(4), json!(3), json!(2)]);
        assert!(search.results().iter().all(|hit| hit["sender"] == "bob"));
        assert_eq!(
            *seen.lock(),
            vec![
                "$.search.start",
                "message",
                "message",
                "message",
                "$.search.finish"
            ]
        );
        assert!(!search.start());
    }

    #[tokio::test]
    async fn test_search_pages_through_history() {
        let network = MemoryNetwork::new();
        let mut config = ColloquyConfig::default();
        config.engine.history_page_size = 2;
        let engine = ChatEngine::from_config(&config, Arc::new(network.client("ada")));
        let lobby = engine.chat("lobby").unwrap();
        for n in 0..5 {
            lobby.publish("message", json!({ "n": n })).await.unwrap();
        }

        let everything = lobby.search(SearchQuery::new().limit(10)).unwrap();
        assert_eq!(
            everything.finished().await,
            SearchStatus::Finished { found: 5 }
        );
        assert_eq!(everything.results()[4]["data"]["n"], 0);

        let one_page = lobby.search(SearchQuery::new().limit(10).pages(1)).unwrap();
        assert_eq!(
            one_page.finished().await,
            SearchStatus::Finished { found: 2 }
        );
    }

    #[tokio::test]
    async fn test_search_reports_transport_failure() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.client("ada"));
        let engine = ChatEngine::from_config(&ColloquyConfig::default(), transport.clone());
        let lobby = engine.chat("lobby").unwrap();
        transport.disconnect();

        let search = lobby.search(SearchQuery::new()).unwrap();
        let seen = record(&search);

        assert!(matches!(
            search.finished().await,
            SearchStatus::Failed { .. }
        ));
        assert_eq!(*seen.lock(), vec!["$.search.start", "$.error.search"]);
        assert!(search.results().is_empty());
    }

    #[tokio::test]
    async fn test_search_hits_pass_search_middlewares() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let lobby = engine.chat("lobby").unwrap();
        for n in 0..6 {
            lobby.publish("message", json!({ "n": n })).await.unwrap();
        }
        engine
            .register_proto_plugin(ObjectType::Search, PluginRegistration::new(&EVEN_ONLY))
            .unwrap();
        assert!(!lobby.has_plugin("even-only"));

        let search = lobby.search(SearchQuery::new().limit(2)).unwrap();
        assert!(search.has_plugin("even-only"));
        let seen = record(&search);

        assert_eq!(search.finished().await, SearchStatus::Finished { found: 2 });

        let numbers: Vec<Payload> = search
            .results()
            .iter()
            .map(|hit| hit["data"]["n"].clone())
            .collect();
        assert_eq!(numbers, vec![json!(4), json!(2)]);
        assert_eq!(
            *seen.lock(),
            vec!["$.search.start", "message", "message", "$.search.finish"]
        );
    }
}
