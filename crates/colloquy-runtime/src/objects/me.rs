use std::collections::HashMap;
use std::sync::Arc;

use colloquy_core::{ChatObject, ObjectCore, ObjectType, Payload};
use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use super::{Chat, Session, ensure_valid};
use crate::context::EngineContext;
use crate::error::EngineResult;

/// The local user.
///
/// Owns the [`Session`] and publishes its own presence state.
pub struct Me {
    core: ObjectCore,
    ctx: Arc<EngineContext>,
    session: Arc<Session>,
    states: Mutex<HashMap<String, Payload>>,
}

engine_object!(Me);

impl Me {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        let uuid = ctx.uuid().to_string();
        Self {
            core: ObjectCore::new(ObjectType::Me, uuid.as_str()),
            session: Arc::new(Session::new(Arc::clone(&ctx), &uuid)),
            ctx,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn uuid(&self) -> &str {
        self.core.identifier()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The state last set on `chat`.
    pub fn state(&self, chat: &Chat) -> Option<Payload> {
        self.states.lock().get(chat.channel()).cloned()
    }

    /// Publishes new presence state on `chat`.
    ///
    /// Emits `$.state` with `{ chat, state }` once the network accepted it.
    pub async fn update_state(&self, chat: &Chat, state: Payload) -> EngineResult<()> {
        ensure_valid(self)?;
        self.ctx
            .transport
            .set_state(chat.channel(), state.clone())
            .await?;
        self.states
            .lock()
            .insert(chat.channel().to_string(), state.clone());

        debug!(chat = %chat.channel(), "State updated");
        self.emitter()
            .emit_locally("$.state", json!({ "chat": chat.channel(), "state": state }));
        Ok(())
    }
}
