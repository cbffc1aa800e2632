//! State shared between the engine and every object it creates.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use colloquy_core::{BoxedTransport, ChatObject, EventEmitter, InboundMessage};
use colloquy_framework::{Location, PipelineOutcome, PluginManager, TemporaryObjects};
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ColloquyConfig, EngineConfig};
use crate::envelope::Envelope;
use crate::error::{EngineError, EngineResult};
use crate::objects::{Chat, Me, User};

#[derive(Default)]
struct Registry {
    /// Keyed by channel.
    chats: HashMap<String, Arc<Chat>>,
    /// Keyed by uuid.
    users: HashMap<String, Arc<User>>,
    me: Option<Arc<Me>>,
}

pub(crate) struct EngineContext {
    pub(crate) config: EngineConfig,
    pub(crate) transport: BoxedTransport,
    pub(crate) plugins: PluginManager,
    pub(crate) temporaries: Arc<TemporaryObjects>,
    pub(crate) emitter: EventEmitter,
    pub(crate) shutdown: CancellationToken,
    registry: Mutex<Registry>,
}

impl EngineContext {
    pub(crate) fn new(config: &ColloquyConfig, transport: BoxedTransport) -> Self {
        Self {
            config: config.engine.clone(),
            plugins: PluginManager::new(config.plugins.clone()),
            temporaries: Arc::new(TemporaryObjects::new(config.engine.temporary())),
            emitter: EventEmitter::new("engine"),
            shutdown: CancellationToken::new(),
            registry: Mutex::new(Registry::default()),
            transport,
        }
    }

    pub(crate) fn uuid(&self) -> &str {
        self.transport.uuid()
    }

    pub(crate) fn channel_for(&self, name: &str) -> String {
        format!("{}#chat#{}", self.config.namespace, name)
    }

    pub(crate) fn ensure_running(&self) -> EngineResult<()> {
        if self.shutdown.is_cancelled() {
            Err(EngineError::Destroyed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn apply_proto_plugins<T: ChatObject>(&self, object: &Arc<T>) -> usize {
        let object: Arc<dyn ChatObject> = object.clone();
        self.plugins.setup_proto_plugins_for(&object)
    }

    // ─── Registry ────────────────────────────────────────────────────────────

    /// Returns the chat called `name`, creating it on first use.
    pub(crate) fn chat(self: &Arc<Self>, name: &str) -> EngineResult<Arc<Chat>> {
        self.ensure_running()?;
        if name.trim().is_empty() {
            return Err(EngineError::InvalidChatName(name.to_string()));
        }

        let channel = self.channel_for(name);
        if let Some(chat) = self.chat_by_channel(&channel) {
            return Ok(chat);
        }

        // Built and equipped outside the lock; a concurrent creator wins and
        // this instance is dropped.
        let chat = Arc::new(Chat::new(Arc::clone(self), name, channel.clone()));
        self.apply_proto_plugins(&chat);
        let chat = match self.registry.lock().chats.entry(channel.clone()) {
            Entry::Occupied(existing) => return Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => Arc::clone(slot.insert(chat)),
        };

        debug!(chat = %channel, "Chat created");
        self.emitter
            .emit_locally("$.created.chat", json!({ "chat": channel, "name": name }));
        Ok(chat)
    }

    pub(crate) fn chat_by_channel(&self, channel: &str) -> Option<Arc<Chat>> {
        self.registry.lock().chats.get(channel).cloned()
    }

    pub(crate) fn chats(&self) -> Vec<Arc<Chat>> {
        self.registry.lock().chats.values().cloned().collect()
    }

    pub(crate) fn remove_chat(&self, channel: &str) -> Option<Arc<Chat>> {
        self.registry.lock().chats.remove(channel)
    }

    /// Returns the user with `uuid`, creating it on first use.
    pub(crate) fn user(self: &Arc<Self>, uuid: &str) -> EngineResult<Arc<User>> {
        self.ensure_running()?;
        if let Some(user) = self.registry.lock().users.get(uuid) {
            return Ok(Arc::clone(user));
        }

        let user = Arc::new(User::new(Arc::clone(self), uuid));
        self.apply_proto_plugins(&user);
        let user = match self.registry.lock().users.entry(uuid.to_string()) {
            Entry::Occupied(existing) => return Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => Arc::clone(slot.insert(user)),
        };

        debug!(user = %uuid, "User created");
        self.emitter
            .emit_locally("$.created.user", json!({ "user": uuid }));
        Ok(user)
    }

    pub(crate) fn users(&self) -> Vec<Arc<User>> {
        self.registry.lock().users.values().cloned().collect()
    }

    pub(crate) fn me(&self) -> Option<Arc<Me>> {
        self.registry.lock().me.clone()
    }

    /// Installs the local user unless one exists; returns the installed one.
    pub(crate) fn install_me(&self, me: Arc<Me>) -> Arc<Me> {
        Arc::clone(self.registry.lock().me.get_or_insert(me))
    }

    /// Empties the registry, handing every object back for teardown.
    pub(crate) fn drain(&self) -> (Vec<Arc<Chat>>, Vec<Arc<User>>, Option<Arc<Me>>) {
        let mut registry = self.registry.lock();
        (
            registry.chats.drain().map(|(_, chat)| chat).collect(),
            registry.users.drain().map(|(_, user)| user).collect(),
            registry.me.take(),
        )
    }

    // ─── Inbound path ────────────────────────────────────────────────────────

    /// Delivers one network message: decode, `On` middlewares, local emit.
    pub(crate) async fn receive(self: &Arc<Self>, message: InboundMessage) {
        let InboundMessage {
            channel,
            payload,
            timetoken,
            ..
        } = message;

        let envelope = match Envelope::from_payload(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.report_receive_error(&channel, &e);
                return;
            }
        };

        let Some(chat) = self.chat_by_channel(&channel).filter(|chat| chat.is_valid()) else {
            debug!(channel = %channel, event = %envelope.event, "Message for unknown chat dropped");
            return;
        };

        if let Err(e) = self.user(&envelope.sender) {
            debug!(sender = %envelope.sender, error = %e, "Sender not registered");
        }

        let event = envelope.event.clone();
        let payload = match envelope.delivered(timetoken) {
            Ok(payload) => payload,
            Err(e) => {
                self.report_receive_error(&channel, &e);
                return;
            }
        };

        match self
            .plugins
            .run_middlewares(Location::On, &event, &*chat, payload)
            .await
        {
            PipelineOutcome::Delivered(payload) => {
                chat.emitter().emit_locally(&event, payload);
            }
            PipelineOutcome::Rejected { plugin } => {
                debug!(chat = %channel, event = %event, plugin = %plugin, "Inbound event rejected");
            }
        }
    }

    fn report_receive_error(&self, channel: &str, error: &serde_json::Error) {
        warn!(channel = %channel, error = %error, "Dropping malformed message");
        self.emitter.emit_locally(
            "$.error.receive",
            json!({ "channel": channel, "error": error.to_string() }),
        );
    }
}
