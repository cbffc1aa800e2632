//! The engine facade.
//!
//! [`ChatEngine`] owns the transport, the plugin manager, the temporary object
//! store and the registries of chats and users. It is the single consumer of
//! the transport's inbound stream: one task drains it and delivers messages
//! in arrival order.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use colloquy_runtime::ChatEngine;
//!
//! let engine = ChatEngine::builder()
//!     .config_file("colloquy.toml")
//!     .transport(transport)
//!     .build()?;
//!
//! let me = engine.connect(None).await?;
//! let lobby = engine.chat("lobby")?;
//! lobby.connect().await?;
//! lobby.emitter().on("message", |event: &EmittedEvent| {
//!     println!("{}: {}", event.data["sender"], event.data["data"]["text"]);
//! });
//! lobby.publish("message", json!({ "text": "hello" })).await?;
//! ```
//!
//! # Engine events
//!
//! | Event | Data |
//! |-------|------|
//! | `$.ready` | `{ uuid }` |
//! | `$.created.chat` | `{ chat, name }` |
//! | `$.created.user` | `{ user }` |
//! | `$.error.receive` | `{ channel, error }` |
//! | `$.destroyed` | `{ uuid }` |

use std::path::Path;
use std::sync::Arc;

use colloquy_core::{
    BoxedTransport, EventEmitter, InboundMessage, ObjectType, Payload,
};
use colloquy_framework::{PluginManager, PluginRegistration, PluginResult, TemporaryObjects};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ColloquyConfig, ConfigLoader};
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::logging;
use crate::objects::{Chat, Me, PluginHost, User};

/// Entry point of the SDK.
pub struct ChatEngine {
    config: ColloquyConfig,
    ctx: Arc<EngineContext>,
    /// Serialises concurrent `connect` calls.
    connecting: tokio::sync::Mutex<()>,
    /// Inbound stream kept across a failed `connect`.
    inbound: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatEngine {
    /// Creates an engine configured from `colloquy.toml` in the current
    /// directory and `COLLOQUY_*` variables, falling back to defaults.
    pub fn new(transport: BoxedTransport) -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                ColloquyConfig::default()
            });

        Self::from_config(&config, transport)
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Creates an engine from a loaded configuration.
    ///
    /// Initializes logging from `config.logging` unless a subscriber is
    /// already installed.
    pub fn from_config(config: &ColloquyConfig, transport: BoxedTransport) -> Self {
        logging::init_from_config(&config.logging);

        if let Some(uuid) = &config.user.uuid
            && uuid != transport.uuid()
        {
            warn!(
                configured = %uuid,
                transport = %transport.uuid(),
                "Configured uuid differs from the transport's, using the transport's"
            );
        }

        info!(
            uuid = %transport.uuid(),
            namespace = %config.engine.namespace,
            log_level = %config.logging.level,
            "Chat engine initialized"
        );

        Self {
            config: config.clone(),
            ctx: Arc::new(EngineContext::new(config, transport)),
            connecting: tokio::sync::Mutex::new(()),
            inbound: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ColloquyConfig {
        &self.config
    }

    /// Uuid of the local user.
    pub fn uuid(&self) -> &str {
        self.ctx.uuid()
    }

    /// The engine's own event emitter.
    pub fn emitter(&self) -> &EventEmitter {
        &self.ctx.emitter
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.ctx.plugins
    }

    pub fn temporaries(&self) -> &Arc<TemporaryObjects> {
        &self.ctx.temporaries
    }

    /// Registers a plugin for every chat, user, me or search created from
    /// now on.
    pub fn register_proto_plugin(
        &self,
        object_type: ObjectType,
        registration: PluginRegistration,
    ) -> PluginResult<()> {
        self.ctx.plugins.register_proto_plugin(object_type, registration)
    }

    pub fn unregister_proto_plugin(
        &self,
        object_type: ObjectType,
        identifier: &str,
    ) -> PluginResult<()> {
        self.ctx
            .plugins
            .unregister_proto_plugin(object_type, identifier)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Brings the engine online.
    ///
    /// Publishes `state` (or the configured `user.state`) on the global chat,
    /// joins it, then installs the local user and starts the inbound loop and
    /// the temporary object sweeper. Emits `$.ready`. Calling it again returns
    /// the existing local user.
    ///
    /// On failure the engine stays disconnected and `connect` may be retried.
    pub async fn connect(&self, state: Option<Payload>) -> EngineResult<Arc<Me>> {
        let _guard = self.connecting.lock().await;
        self.ctx.ensure_running()?;
        if let Some(me) = self.ctx.me() {
            return Ok(me);
        }

        let inbound = self
            .inbound
            .lock()
            .take()
            .or_else(|| self.ctx.transport.take_inbound())
            .ok_or(EngineError::InboundUnavailable)?;

        let me = Arc::new(Me::new(Arc::clone(&self.ctx)));
        self.ctx.apply_proto_plugins(&me);

        let global = match self.join_global(&me, state).await {
            Ok(global) => global,
            Err(e) => {
                *self.inbound.lock() = Some(inbound);
                me.session().destruct();
                me.destruct();
                warn!(uuid = %self.uuid(), error = %e, "Connect failed");
                return Err(e);
            }
        };

        let me = self.ctx.install_me(me);
        me.session().join(&global);
        {
            let mut tasks = self.tasks.lock();
            tasks.push(spawn_inbound_loop(Arc::clone(&self.ctx), inbound));
            if let Some(sweeper) = self.ctx.temporaries.start() {
                tasks.push(sweeper);
            }
        }

        info!(uuid = %self.uuid(), global = %global.channel(), "Chat engine ready");
        self.ctx
            .emitter
            .emit_locally("$.ready", json!({ "uuid": self.uuid() }));
        Ok(me)
    }

    /// The fallible part of `connect`. Subscribing comes last so a failure
    /// never leaves the global chat marked connected.
    async fn join_global(&self, me: &Me, state: Option<Payload>) -> EngineResult<Arc<Chat>> {
        let global = self.ctx.chat(&self.config.engine.global_channel)?;
        if let Some(state) = state.or_else(|| self.config.user.state.clone()) {
            me.update_state(&global, state).await?;
        }
        global.connect().await?;
        Ok(global)
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.me().is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.ctx.shutdown.is_cancelled()
    }

    /// Tears everything down.
    ///
    /// Leaves connected chats, destructs every object, stops the background
    /// tasks and releases the temporary store. Later operations fail with
    /// [`EngineError::Destroyed`].
    pub async fn destroy(&self) {
        if self.ctx.shutdown.is_cancelled() {
            return;
        }
        self.ctx.shutdown.cancel();
        self.ctx.temporaries.destroy();

        let (chats, users, me) = self.ctx.drain();
        for chat in &chats {
            if chat.is_connected()
                && let Err(e) = chat.leave().await
            {
                warn!(chat = %chat.channel(), error = %e, "Failed to leave chat during teardown");
            }
            chat.destruct();
        }
        for user in &users {
            user.destruct();
        }
        if let Some(me) = &me {
            me.session().destruct();
            me.destruct();
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        info!(
            uuid = %self.uuid(),
            chats = chats.len(),
            users = users.len(),
            "Chat engine destroyed"
        );
        self.ctx
            .emitter
            .emit_locally("$.destroyed", json!({ "uuid": self.uuid() }));
        self.ctx.emitter.clear();
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// The local user, once connected.
    pub fn me(&self) -> Option<Arc<Me>> {
        self.ctx.me()
    }

    /// The chat every client joins on connect.
    pub fn global(&self) -> Option<Arc<Chat>> {
        self.ctx
            .chat_by_channel(&self.ctx.channel_for(&self.config.engine.global_channel))
    }

    /// Returns the chat called `name`, creating it on first use.
    ///
    /// New chats get the `Chat` proto plugins and are announced with
    /// `$.created.chat`. They are not connected.
    pub fn chat(&self, name: &str) -> EngineResult<Arc<Chat>> {
        self.ctx.chat(name)
    }

    pub fn chats(&self) -> Vec<Arc<Chat>> {
        self.ctx.chats()
    }

    /// Returns the user with `uuid`, creating it on first use.
    pub fn user(&self, uuid: &str) -> EngineResult<Arc<User>> {
        self.ctx.user(uuid)
    }

    pub fn users(&self) -> Vec<Arc<User>> {
        self.ctx.users()
    }

    /// Leaves and destructs the chat called `name`.
    ///
    /// Returns `false` if there is no such chat.
    pub async fn destroy_chat(&self, name: &str) -> EngineResult<bool> {
        self.ctx.ensure_running()?;
        let Some(chat) = self.ctx.remove_chat(&self.ctx.channel_for(name)) else {
            return Ok(false);
        };
        let left = chat.leave().await;
        chat.destruct();
        left?;
        debug!(chat = %chat.channel(), "Chat destroyed");
        Ok(true)
    }

    /// Delivers one network message as if it came from the inbound stream.
    pub async fn receive(&self, message: InboundMessage) {
        self.ctx.receive(message).await;
    }
}

impl Drop for ChatEngine {
    fn drop(&mut self) {
        if self.ctx.shutdown.is_cancelled() {
            return;
        }
        self.ctx.shutdown.cancel();
        self.ctx.temporaries.destroy();
        let (chats, users, me) = self.ctx.drain();
        for chat in &chats {
            chat.destruct();
        }
        for user in &users {
            user.destruct();
        }
        if let Some(me) = &me {
            me.session().destruct();
            me.destruct();
        }
    }
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("uuid", &self.uuid())
            .field("connected", &self.is_connected())
            .field("destroyed", &self.is_destroyed())
            .field("plugins", &self.ctx.plugins)
            .field("temporaries", &self.ctx.temporaries)
            .finish()
    }
}

fn spawn_inbound_loop(
    ctx: Arc<EngineContext>,
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
) -> JoinHandle<()> {
    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => ctx.receive(message).await,
                    None => {
                        warn!("Inbound stream closed");
                        break;
                    }
                },
            }
        }
        debug!("Inbound loop stopped");
    })
}

// =============================================================================
// EngineBuilder
// =============================================================================

/// Builder for a [`ChatEngine`] with custom configuration.
///
/// ```rust,ignore
/// let engine = ChatEngine::builder()
///     .config_file("config/colloquy.toml")
///     .profile("production")
///     .transport(transport)
///     .build()?;
/// ```
pub struct EngineBuilder {
    config_loader: ConfigLoader,
    config: Option<ColloquyConfig>,
    transport: Option<BoxedTransport>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            transport: None,
        }
    }

    /// Uses a pre-loaded configuration instead of loading one.
    pub fn config(mut self, config: ColloquyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: ColloquyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn transport(mut self, transport: BoxedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> EngineResult<ChatEngine> {
        let transport = self.transport.ok_or(EngineError::MissingTransport)?;
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        Ok(ChatEngine::from_config(&config, transport))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn test_engine(network: &colloquy_core::MemoryNetwork, uuid: &str) -> ChatEngine {
    ChatEngine::from_config(&ColloquyConfig::default(), Arc::new(network.client(uuid)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use colloquy_core::{ChatObject, EmittedEvent, MemoryNetwork, Timetoken, Transport};
    use colloquy_framework::{
        BoxError, Middleware, MiddlewareFlow, PluginContext, PluginDescriptor, define_plugin,
    };
    use tokio::time::timeout;

    use super::*;
    use crate::objects::{EmitOutcome, EventOutcome};

    struct Censor;

    #[async_trait]
    impl Middleware for Censor {
        async fn run(&self, _event: &str, payload: &mut Payload) -> MiddlewareFlow {
            let banned = payload["data"]["text"]
                .as_str()
                .is_some_and(|text| text.contains("darn"));
            if banned {
                MiddlewareFlow::Reject
            } else {
                MiddlewareFlow::Continue
            }
        }
    }

    fn create_censor(_: &PluginContext) -> Result<Arc<dyn Middleware>, BoxError> {
        Ok(Arc::new(Censor))
    }

    static CENSOR: PluginDescriptor = define_plugin! {
        name: "censor",
        middleware: { location: Emit, types: [Chat], events: ["message"], create: create_censor },
    };

    struct Shout;

    #[async_trait]
    impl Middleware for Shout {
        async fn run(&self, _event: &str, payload: &mut Payload) -> MiddlewareFlow {
            if let Some(text) = payload["data"]["text"].as_str() {
                payload["data"]["text"] = text.to_uppercase().into();
            }
            MiddlewareFlow::Continue
        }
    }

    fn create_shout(_: &PluginContext) -> Result<Arc<dyn Middleware>, BoxError> {
        Ok(Arc::new(Shout))
    }

    static SHOUT: PluginDescriptor = define_plugin! {
        name: "shout",
        middleware: { location: On, types: [Chat], events: ["message"], create: create_shout },
    };

    fn forward(emitter: &EventEmitter, pattern: &str) -> mpsc::UnboundedReceiver<EmittedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        emitter.on(pattern, move |event: &EmittedEvent| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<EmittedEvent>) -> EmittedEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("emitter dropped")
    }

    #[tokio::test]
    async fn test_connect_joins_global_and_emits_ready() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let mut ready = forward(engine.emitter(), "$.ready");

        let me = engine.connect(Some(json!({ "team": "red" }))).await.unwrap();

        assert_eq!(me.uuid(), "ada");
        assert_eq!(next(&mut ready).await.data, json!({ "uuid": "ada" }));
        let global = engine.global().unwrap();
        assert!(global.is_connected());
        assert_eq!(network.subscribers("chat-engine#chat#global"), vec!["ada"]);
        assert!(me.session().contains(&global));
        assert_eq!(me.state(&global), Some(json!({ "team": "red" })));

        let again = engine.connect(None).await.unwrap();
        assert!(Arc::ptr_eq(&me, &again));
        assert!(ready.try_recv().is_err());

        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_failed_connect_can_be_retried() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.client("ada"));
        let engine = ChatEngine::from_config(&ColloquyConfig::default(), transport.clone());
        let mut ready = forward(engine.emitter(), "$.ready");

        transport.disconnect();
        assert!(matches!(
            engine.connect(Some(json!({ "team": "red" }))).await,
            Err(EngineError::Transport(_))
        ));
        assert!(!engine.is_connected());
        assert!(engine.me().is_none());
        assert!(!engine.global().unwrap().is_connected());
        assert!(ready.try_recv().is_err());

        transport.reconnect();
        let me = engine.connect(Some(json!({ "team": "red" }))).await.unwrap();

        assert_eq!(next(&mut ready).await.data, json!({ "uuid": "ada" }));
        let global = engine.global().unwrap();
        assert!(global.is_connected());
        assert_eq!(network.subscribers("chat-engine#chat#global"), vec!["ada"]);
        assert!(me.session().contains(&global));
        assert_eq!(me.state(&global), Some(json!({ "team": "red" })));

        engine.destroy().await;
    }

    #[tokio::test]
    async fn test_message_reaches_other_engine() {
        let network = MemoryNetwork::new();
        let ada = test_engine(&network, "ada");
        let bob = test_engine(&network, "bob");
        ada.connect(None).await.unwrap();
        bob.connect(None).await.unwrap();

        let lobby = bob.chat("lobby").unwrap();
        lobby.connect().await.unwrap();
        let mut messages = forward(lobby.emitter(), "message");

        let outcome = ada
            .chat("lobby")
            .unwrap()
            .publish("message", json!({ "text": "hi" }))
            .await
            .unwrap();
        let EmitOutcome::Published { timetoken, .. } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };

        let event = next(&mut messages).await;
        assert_eq!(event.name, "message");
        assert_eq!(event.emitter, "chat-engine#chat#lobby");
        assert_eq!(event.data["data"]["text"], "hi");
        assert_eq!(event.data["sender"], "ada");
        assert_eq!(event.data["timetoken"], json!(timetoken.0));
        assert!(bob.users().iter().any(|user| user.uuid() == "ada"));

        ada.destroy().await;
        bob.destroy().await;
    }

    #[tokio::test]
    async fn test_emit_middleware_rejects_before_publish() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        engine
            .register_proto_plugin(ObjectType::Chat, PluginRegistration::new(&CENSOR))
            .unwrap();

        let lobby = engine.chat("lobby").unwrap();
        assert!(lobby.has_plugin("censor"));

        let outcome = lobby
            .publish("message", json!({ "text": "darn it" }))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EmitOutcome::Rejected {
                plugin: "censor".to_string()
            }
        );
        assert_eq!(network.history_len("chat-engine#chat#lobby"), 0);

        let outcome = lobby
            .publish("message", json!({ "text": "hello" }))
            .await
            .unwrap();
        assert!(!outcome.is_rejected());
        assert_eq!(network.history_len("chat-engine#chat#lobby"), 1);

        let outcome = lobby
            .publish("typing", json!({ "text": "darn" }))
            .await
            .unwrap();
        assert!(!outcome.is_rejected());
    }

    #[tokio::test]
    async fn test_proto_plugins_only_reach_new_objects() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let before = engine.chat("before").unwrap();

        engine
            .register_proto_plugin(ObjectType::Chat, PluginRegistration::new(&CENSOR))
            .unwrap();
        let after = engine.chat("after").unwrap();

        assert!(!before.has_plugin("censor"));
        assert!(after.has_plugin("censor"));

        engine
            .unregister_proto_plugin(ObjectType::Chat, "censor")
            .unwrap();
        assert!(after.has_plugin("censor"));
        assert!(!engine.chat("later").unwrap().has_plugin("censor"));
        assert!(
            engine
                .unregister_proto_plugin(ObjectType::Chat, "censor")
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_on_middleware_transforms_inbound() {
        let network = MemoryNetwork::new();
        let ada = test_engine(&network, "ada");
        let bob = test_engine(&network, "bob");
        bob.register_proto_plugin(ObjectType::Chat, PluginRegistration::new(&SHOUT))
            .unwrap();
        bob.connect(None).await.unwrap();

        let lobby = bob.chat("lobby").unwrap();
        lobby.connect().await.unwrap();
        let mut messages = forward(lobby.emitter(), "message");

        ada.chat("lobby")
            .unwrap()
            .publish("message", json!({ "text": "quiet" }))
            .await
            .unwrap();

        assert_eq!(next(&mut messages).await.data["data"]["text"], "QUIET");
        bob.destroy().await;
    }

    #[tokio::test]
    async fn test_malformed_message_reports_receive_error() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let mut errors = forward(engine.emitter(), "$.error.*");

        engine
            .receive(InboundMessage {
                channel: "chat-engine#chat#lobby".to_string(),
                payload: json!("not an envelope"),
                timetoken: Timetoken(1),
                publisher: None,
            })
            .await;

        let error = next(&mut errors).await;
        assert_eq!(error.name, "$.error.receive");
        assert_eq!(error.data["channel"], "chat-engine#chat#lobby");
    }

    #[tokio::test]
    async fn test_message_for_unknown_chat_is_dropped() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let mut created = forward(engine.emitter(), "$.created.*");

        engine
            .receive(InboundMessage {
                channel: "chat-engine#chat#nowhere".to_string(),
                payload: json!({ "event": "message", "sender": "bob", "chat": "chat-engine#chat#nowhere" }),
                timetoken: Timetoken(1),
                publisher: Some("bob".to_string()),
            })
            .await;

        assert!(engine.chats().is_empty());
        assert!(engine.users().is_empty());
        assert!(created.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_is_created_once() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let mut created = forward(engine.emitter(), "$.created.chat");

        let first = engine.chat("lobby").unwrap();
        let second = engine.chat("lobby").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "lobby");
        assert!(!first.is_connected());
        assert_eq!(
            next(&mut created).await.data,
            json!({ "chat": "chat-engine#chat#lobby", "name": "lobby" })
        );
        assert!(created.try_recv().is_err());
        assert!(matches!(
            engine.chat("  "),
            Err(EngineError::InvalidChatName(_))
        ));
    }

    #[tokio::test]
    async fn test_emit_tracker_outlives_caller() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let lobby = engine.chat("lobby").unwrap();

        let tracker = lobby.emit("message", json!({ "text": "hi" })).unwrap();
        assert!(engine.temporaries().contains(&tracker));
        assert_eq!(tracker.name(), "message");
        assert_eq!(tracker.chat(), "chat-engine#chat#lobby");

        let outcome = tracker.outcome().await;
        assert!(outcome.is_emitted());
        assert_eq!(tracker.try_outcome(), Some(outcome));
        assert_eq!(network.history_len("chat-engine#chat#lobby"), 1);
    }

    #[tokio::test]
    async fn test_emit_tracker_reports_rejection() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        engine
            .register_proto_plugin(ObjectType::Chat, PluginRegistration::new(&CENSOR))
            .unwrap();
        let lobby = engine.chat("lobby").unwrap();

        let tracker = lobby.emit("message", json!({ "text": "darn" })).unwrap();

        assert_eq!(
            tracker.outcome().await,
            EventOutcome::Rejected {
                plugin: "censor".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_emit_tracker_reports_publish_failure() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.client("ada"));
        let engine = ChatEngine::from_config(&ColloquyConfig::default(), transport.clone());
        let lobby = engine.chat("lobby").unwrap();
        transport.disconnect();

        let tracker = lobby.emit("message", json!({ "text": "hi" })).unwrap();

        assert!(matches!(
            tracker.outcome().await,
            EventOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_destroy_chat() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let me = engine.connect(None).await.unwrap();
        let lobby = engine.chat("lobby").unwrap();
        lobby.connect().await.unwrap();
        assert!(me.session().contains(&lobby));

        assert!(engine.destroy_chat("lobby").await.unwrap());

        assert!(!lobby.is_valid());
        assert!(!me.session().contains(&lobby));
        assert!(network.subscribers("chat-engine#chat#lobby").is_empty());
        assert!(!engine.destroy_chat("lobby").await.unwrap());
        assert!(!Arc::ptr_eq(&lobby, &engine.chat("lobby").unwrap()));
    }

    #[tokio::test]
    async fn test_destroy_invalidates_everything() {
        let network = MemoryNetwork::new();
        let engine = test_engine(&network, "ada");
        let me = engine.connect(None).await.unwrap();
        let lobby = engine.chat("lobby").unwrap();
        lobby.connect().await.unwrap();
        let bob = engine.user("bob").unwrap();
        let mut destroyed = forward(engine.emitter(), "$.destroyed");

        engine.destroy().await;

        assert!(engine.is_destroyed());
        assert!(!engine.is_connected());
        assert_eq!(next(&mut destroyed).await.data, json!({ "uuid": "ada" }));
        assert!(!lobby.is_valid());
        assert!(!bob.is_valid());
        assert!(!me.is_valid());
        assert!(!me.session().is_valid());
        assert!(network.subscribers("chat-engine#chat#lobby").is_empty());
        assert!(engine.temporaries().is_destroyed());

        assert!(matches!(engine.chat("other"), Err(EngineError::Destroyed)));
        assert!(matches!(
            engine.connect(None).await,
            Err(EngineError::Destroyed)
        ));
        assert!(matches!(
            lobby.publish("message", json!({})).await,
            Err(EngineError::InvalidObject(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_needs_inbound_stream() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.client("ada"));
        let _stolen = transport.take_inbound();
        let engine = ChatEngine::from_config(&ColloquyConfig::default(), transport);

        assert!(matches!(
            engine.connect(None).await,
            Err(EngineError::InboundUnavailable)
        ));
        assert!(!engine.is_connected());
    }

    #[test]
    fn test_builder_requires_transport() {
        let result = ChatEngine::builder()
            .without_env()
            .config(ColloquyConfig::default())
            .build();
        assert!(matches!(result, Err(EngineError::MissingTransport)));
    }

    #[test]
    fn test_builder_uses_preloaded_config() {
        let network = MemoryNetwork::new();
        let mut config = ColloquyConfig::default();
        config.engine.namespace = "acme".to_string();

        let engine = ChatEngine::builder()
            .config(config)
            .transport(Arc::new(network.client("ada")))
            .build()
            .unwrap();

        assert_eq!(engine.uuid(), "ada");
        assert_eq!(engine.config().engine.namespace, "acme");
    }
}
