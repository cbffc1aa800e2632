use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colloquy_core::{ChatObject, ObjectCore, ObjectType, Payload, Timetoken};
use colloquy_framework::{Location, PipelineOutcome};
use serde_json::json;
use tracing::{debug, info};

use super::{Event, Search, SearchQuery, User, ensure_valid};
use crate::context::EngineContext;
use crate::envelope::Envelope;
use crate::error::EngineResult;

/// Result of [`Chat::publish`].
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOutcome {
    /// The payload after `Emit` middlewares was published.
    Published {
        timetoken: Timetoken,
        payload: Payload,
    },
    /// An `Emit` middleware vetoed the event; nothing was published.
    Rejected { plugin: String },
}

impl EmitOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// A named room backed by one pub/sub channel (`{namespace}#chat#{name}`).
///
/// Inbound events are dispatched on the chat's emitter under their own name,
/// after the chat's `On` middlewares ran. Lifecycle events:
///
/// | Event | Data |
/// |-------|------|
/// | `$.connected` | `{ chat }` |
/// | `$.disconnected` | `{ chat }` |
/// | `$.online.here` | `{ user, state }`, one per participant |
pub struct Chat {
    core: ObjectCore,
    ctx: Arc<EngineContext>,
    name: String,
    connected: AtomicBool,
}

engine_object!(Chat);

impl Chat {
    pub(crate) fn new(ctx: Arc<EngineContext>, name: &str, channel: String) -> Self {
        Self {
            core: ObjectCore::new(ObjectType::Chat, channel),
            ctx,
            name: name.to_string(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pub/sub channel of this chat.
    pub fn channel(&self) -> &str {
        self.core.identifier()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Subscribes to the chat and records it in the local user's session.
    pub async fn connect(self: &Arc<Self>) -> EngineResult<()> {
        ensure_valid(self.as_ref())?;
        if self.is_connected() {
            return Ok(());
        }

        self.ctx
            .transport
            .subscribe(&[self.channel().to_string()])
            .await?;
        self.connected.store(true, Ordering::Release);
        info!(chat = %self.channel(), "Connected to chat");

        self.emitter()
            .emit_locally("$.connected", json!({ "chat": self.channel() }));
        if let Some(me) = self.ctx.me() {
            me.session().join(self);
        }
        Ok(())
    }

    /// Unsubscribes from the chat.
    pub async fn leave(&self) -> EngineResult<()> {
        ensure_valid(self)?;
        if !self.is_connected() {
            return Ok(());
        }

        self.ctx
            .transport
            .unsubscribe(&[self.channel().to_string()])
            .await?;
        self.connected.store(false, Ordering::Release);
        info!(chat = %self.channel(), "Left chat");

        self.emitter()
            .emit_locally("$.disconnected", json!({ "chat": self.channel() }));
        if let Some(me) = self.ctx.me() {
            me.session().leave(self);
        }
        Ok(())
    }

    /// Runs the `Emit` middlewares for `event` and publishes the result.
    ///
    /// A rejection is not an error: it is reported as
    /// [`EmitOutcome::Rejected`] and nothing reaches the network.
    pub async fn publish(&self, event: &str, data: Payload) -> EngineResult<EmitOutcome> {
        ensure_valid(self)?;

        let envelope = Envelope::new(event, data, self.ctx.uuid(), self.channel());
        let payload = envelope.to_payload()?;

        match self
            .ctx
            .plugins
            .run_middlewares(Location::Emit, event, self, payload)
            .await
        {
            PipelineOutcome::Rejected { plugin } => {
                debug!(chat = %self.channel(), event, plugin = %plugin, "Outbound event rejected");
                Ok(EmitOutcome::Rejected { plugin })
            }
            PipelineOutcome::Delivered(payload) => {
                let timetoken = self
                    .ctx
                    .transport
                    .publish(self.channel(), payload.clone())
                    .await?;
                debug!(chat = %self.channel(), event, %timetoken, "Event published");
                Ok(EmitOutcome::Published { timetoken, payload })
            }
        }
    }

    /// Publishes `event` in the background.
    ///
    /// The returned tracker is kept alive by the engine's temporary store, so
    /// it may be dropped right away. Must be called within a tokio runtime.
    pub fn emit(self: &Arc<Self>, event: &str, data: Payload) -> EngineResult<Arc<Event>> {
        ensure_valid(self.as_ref())?;

        let tracker = Arc::new(Event::new(Arc::clone(&self.ctx), event, self.channel()));
        self.ctx.temporaries.store(&tracker);

        let chat = Arc::clone(self);
        let pending = Arc::clone(&tracker);
        let event = event.to_string();
        tokio::spawn(async move {
            let result = chat.publish(&event, data).await;
            pending.complete(result.into());
        });

        Ok(tracker)
    }

    /// Prepares a history search; call [`Search::start`] after attaching
    /// handlers.
    ///
    /// The search gets the `Search` proto plugins and is kept alive by the
    /// engine's temporary store.
    pub fn search(self: &Arc<Self>, query: SearchQuery) -> EngineResult<Arc<Search>> {
        ensure_valid(self.as_ref())?;

        let search = Arc::new(Search::new(
            Arc::clone(&self.ctx),
            self.channel(),
            query,
        ));
        self.ctx.apply_proto_plugins(&search);
        self.ctx.temporaries.store(&search);
        Ok(search)
    }

    /// Lists the users present, refreshing their cached state.
    ///
    /// Emits `$.online.here` for each of them.
    pub async fn participants(&self) -> EngineResult<Vec<Arc<User>>> {
        ensure_valid(self)?;

        let participants = self.ctx.transport.presence(self.channel()).await?;
        let mut users = Vec::with_capacity(participants.len());
        for participant in participants {
            let user = self.ctx.user(&participant.uuid)?;
            if let Some(state) = &participant.state {
                user.assign_state(self.channel(), state.clone());
            }
            self.emitter().emit_locally(
                "$.online.here",
                json!({ "user": participant.uuid, "state": participant.state }),
            );
            users.push(user);
        }
        Ok(users)
    }
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("channel", &self.channel())
            .field("connected", &self.is_connected())
            .field("valid", &self.is_valid())
            .finish()
    }
}
