use std::collections::HashMap;
use std::sync::Arc;

use colloquy_core::{ChatObject, ObjectCore, ObjectType, Payload};
use parking_lot::Mutex;
use serde_json::json;

use super::{Chat, ensure_valid};
use crate::context::EngineContext;
use crate::error::EngineResult;

/// A user of the network, identified by uuid.
///
/// Keeps the last known state per chat and emits `$.state` with
/// `{ chat, state }` whenever it changes.
pub struct User {
    core: ObjectCore,
    ctx: Arc<EngineContext>,
    states: Mutex<HashMap<String, Payload>>,
}

engine_object!(User);

impl User {
    pub(crate) fn new(ctx: Arc<EngineContext>, uuid: &str) -> Self {
        Self {
            core: ObjectCore::new(ObjectType::User, uuid),
            ctx,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn uuid(&self) -> &str {
        self.core.identifier()
    }

    /// Last known state on `chat`, without a network round trip.
    pub fn cached_state(&self, chat: &Chat) -> Option<Payload> {
        self.states.lock().get(chat.channel()).cloned()
    }

    /// Fetches the user's state on `chat` and refreshes the cache.
    pub async fn state(&self, chat: &Chat) -> EngineResult<Option<Payload>> {
        ensure_valid(self)?;
        let state = self
            .ctx
            .transport
            .get_state(chat.channel(), self.uuid())
            .await?;
        if let Some(state) = &state {
            self.assign_state(chat.channel(), state.clone());
        }
        Ok(state)
    }

    /// Returns `true` when the cached state changed.
    pub(crate) fn assign_state(&self, channel: &str, state: Payload) -> bool {
        if !self.is_valid() {
            return false;
        }
        let previous = self
            .states
            .lock()
            .insert(channel.to_string(), state.clone());
        if previous.as_ref() == Some(&state) {
            return false;
        }
        self.emitter()
            .emit_locally("$.state", json!({ "chat": channel, "state": state }));
        true
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("uuid", &self.uuid())
            .field("valid", &self.is_valid())
            .finish()
    }
}
