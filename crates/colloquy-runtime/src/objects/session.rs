use std::sync::{Arc, Weak};

use colloquy_core::{ChatObject, ObjectCore, ObjectType};
use parking_lot::Mutex;
use serde_json::json;

use super::Chat;
use crate::context::EngineContext;

/// The chats the local user is connected to.
///
/// Emits `$.chat.join` and `$.chat.leave` with `{ chat, name }`.
pub struct Session {
    core: ObjectCore,
    ctx: Arc<EngineContext>,
    chats: Mutex<Vec<Weak<Chat>>>,
}

engine_object!(Session);

impl Session {
    pub(crate) fn new(ctx: Arc<EngineContext>, uuid: &str) -> Self {
        Self {
            core: ObjectCore::new(ObjectType::Session, format!("{uuid}#session")),
            ctx,
            chats: Mutex::new(Vec::new()),
        }
    }

    /// Connected chats, in join order.
    pub fn chats(&self) -> Vec<Arc<Chat>> {
        self.chats
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|chat| chat.is_valid())
            .collect()
    }

    pub fn contains(&self, chat: &Chat) -> bool {
        self.chats().iter().any(|c| c.id() == chat.id())
    }

    /// Returns `false` when `chat` was already recorded.
    pub(crate) fn join(&self, chat: &Arc<Chat>) -> bool {
        if !self.is_valid() {
            return false;
        }
        {
            let mut chats = self.chats.lock();
            chats.retain(|c| c.strong_count() > 0);
            if chats.iter().any(|c| c.upgrade().is_some_and(|c| c.id() == chat.id())) {
                return false;
            }
            chats.push(Arc::downgrade(chat));
        }
        self.emitter().emit_locally(
            "$.chat.join",
            json!({ "chat": chat.channel(), "name": chat.name() }),
        );
        true
    }

    pub(crate) fn leave(&self, chat: &Chat) -> bool {
        if !self.is_valid() {
            return false;
        }
        let removed = {
            let mut chats = self.chats.lock();
            chats.retain(|c| c.strong_count() > 0);
            let before = chats.len();
            chats.retain(|c| c.upgrade().is_none_or(|c| c.id() != chat.id()));
            chats.len() != before
        };
        if removed {
            self.emitter().emit_locally(
                "$.chat.leave",
                json!({ "chat": chat.channel(), "name": chat.name() }),
            );
        }
        removed
    }
}
