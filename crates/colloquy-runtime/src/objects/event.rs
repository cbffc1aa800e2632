use std::sync::Arc;

use colloquy_core::{ChatObject, ObjectCore, ObjectType, Payload, Timetoken};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::chat::EmitOutcome;
use crate::context::EngineContext;
use crate::error::EngineResult;

/// How an emitted event ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Published; `payload` is what went on the wire.
    Emitted {
        timetoken: Timetoken,
        payload: Payload,
    },
    /// An `Emit` middleware vetoed the event.
    Rejected { plugin: String },
    /// The publish failed.
    Failed { error: String },
}

impl EventOutcome {
    pub fn is_emitted(&self) -> bool {
        matches!(self, Self::Emitted { .. })
    }
}

impl From<EngineResult<EmitOutcome>> for EventOutcome {
    fn from(result: EngineResult<EmitOutcome>) -> Self {
        match result {
            Ok(EmitOutcome::Published { timetoken, payload }) => Self::Emitted { timetoken, payload },
            Ok(EmitOutcome::Rejected { plugin }) => Self::Rejected { plugin },
            Err(e) => Self::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Tracks one fire-and-forget [`Chat::emit`](super::Chat::emit).
///
/// Emits `$.emitted`, `$.rejected` or `$.error.publish` once the publish
/// settles. Handlers attached after that miss the event;
/// [`outcome`](Self::outcome) always observes it.
pub struct Event {
    core: ObjectCore,
    ctx: Arc<EngineContext>,
    name: String,
    chat: String,
    outcome: watch::Sender<Option<EventOutcome>>,
}

engine_object!(Event);

impl Event {
    pub(crate) fn new(ctx: Arc<EngineContext>, name: &str, chat: &str) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            core: ObjectCore::new(ObjectType::Event, format!("{chat}#event#{name}")),
            ctx,
            name: name.to_string(),
            chat: chat.to_string(),
            outcome,
        }
    }

    /// Name of the emitted event.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel of the chat the event was emitted on.
    pub fn chat(&self) -> &str {
        &self.chat
    }

    /// The outcome, if the publish already settled.
    pub fn try_outcome(&self) -> Option<EventOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits for the publish to settle.
    pub async fn outcome(&self) -> EventOutcome {
        let mut rx = self.outcome.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or_else(|| EventOutcome::Failed {
                error: "event tracker closed".to_string(),
            }),
            Err(_) => EventOutcome::Failed {
                error: "event tracker closed".to_string(),
            },
        }
    }

    pub(crate) fn complete(&self, outcome: EventOutcome) {
        self.outcome.send_replace(Some(outcome.clone()));
        let emitter = self.emitter();
        match &outcome {
            EventOutcome::Emitted { timetoken, payload } => {
                debug!(chat = %self.chat, event = %self.name, %timetoken, "Event emitted");
                emitter.emit_locally(
                    "$.emitted",
                    json!({ "event": self.name, "timetoken": timetoken, "payload": payload }),
                );
            }
            EventOutcome::Rejected { plugin } => {
                emitter.emit_locally(
                    "$.rejected",
                    json!({ "event": self.name, "plugin": plugin }),
                );
            }
            EventOutcome::Failed { error } => {
                warn!(chat = %self.chat, event = %self.name, error = %error, "Publish failed");
                emitter.emit_locally(
                    "$.error.publish",
                    json!({ "event": self.name, "error": error }),
                );
            }
        }
    }
}
