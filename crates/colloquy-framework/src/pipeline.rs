//! Middleware pipeline.
//!
//! A pipeline run takes the middlewares bound to one object at one
//! [`Location`] whose event patterns match the event, and executes them
//! **sequentially** in plugin order:
//!
//! ```text
//! payload ─► mw₁ ─► mw₂ ─► mw₃ ─► Delivered(payload')
//!                    │
//!                    └─ Reject ─► Rejected { plugin }   (mw₃ never runs)
//! ```
//!
//! Middlewares whose bound object is gone or invalid are skipped. A middleware
//! that panics is treated as a rejection.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Level, debug, error, span};

use colloquy_core::{EventPattern, ObjectHandle, Payload};

use crate::plugin::{Middleware, MiddlewareFlow};

// ─── Location ────────────────────────────────────────────────────────────────

/// Where in the data path a middleware runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Outbound, before publishing.
    Emit,
    /// Inbound, after receiving and before local dispatch.
    On,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emit => "emit",
            Self::On => "on",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emit" => Ok(Self::Emit),
            "on" => Ok(Self::On),
            other => Err(format!("unknown pipeline location: '{other}'")),
        }
    }
}

// ─── PipelineOutcome ─────────────────────────────────────────────────────────

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Every middleware continued; carries the final payload.
    Delivered(Payload),
    /// A middleware rejected the event.
    Rejected {
        /// Identifier of the plugin whose middleware rejected.
        plugin: String,
    },
}

impl PipelineOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// The delivered payload, or `None` when rejected.
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            Self::Delivered(payload) => Some(payload),
            Self::Rejected { .. } => None,
        }
    }
}

// ─── MiddlewareSlot ──────────────────────────────────────────────────────────

/// One installed middleware instance.
#[derive(Clone)]
pub(crate) struct MiddlewareSlot {
    pub(crate) plugin: String,
    pub(crate) location: Location,
    pub(crate) events: Vec<EventPattern>,
    pub(crate) object: ObjectHandle,
    pub(crate) middleware: Arc<dyn Middleware>,
}

impl MiddlewareSlot {
    pub(crate) fn selects(&self, location: Location, event: &str) -> bool {
        self.location == location && self.events.iter().any(|pattern| pattern.matches(event))
    }
}

impl fmt::Debug for MiddlewareSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareSlot")
            .field("plugin", &self.plugin)
            .field("location", &self.location)
            .field("events", &self.events)
            .field("object", &self.object)
            .finish()
    }
}

/// Runs `slots` in order over `payload`.
pub(crate) async fn run_chain(
    slots: Vec<MiddlewareSlot>,
    location: Location,
    event: &str,
    object: &str,
    payload: Payload,
) -> PipelineOutcome {
    let span = span!(
        Level::DEBUG,
        "pipeline",
        location = %location,
        event = %event,
        object = %object
    );
    execute(slots, event, payload).instrument(span).await
}

async fn execute(slots: Vec<MiddlewareSlot>, event: &str, mut payload: Payload) -> PipelineOutcome {
    for slot in slots {
        if !slot.object.is_live() {
            debug!(plugin = %slot.plugin, "Bound object is gone, skipping middleware");
            continue;
        }

        let step = AssertUnwindSafe(slot.middleware.run(event, &mut payload))
            .catch_unwind()
            .await;
        match step {
            Ok(MiddlewareFlow::Continue) => {}
            Ok(MiddlewareFlow::Reject) => {
                debug!(plugin = %slot.plugin, "Middleware rejected event");
                return PipelineOutcome::Rejected {
                    plugin: slot.plugin,
                };
            }
            Err(_) => {
                error!(plugin = %slot.plugin, "Middleware panicked, rejecting event");
                return PipelineOutcome::Rejected {
                    plugin: slot.plugin,
                };
            }
        }
    }
    PipelineOutcome::Delivered(payload)
}
