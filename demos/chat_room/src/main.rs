//! Chat Room Example
//!
//! Two clients, `ada` and `bob`, share an in-memory network. Ada's chats carry
//! a profanity filter that vetoes outgoing messages containing banned words;
//! bob listens in the lobby and finally searches its history.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package chat-room -- --banned darn --banned heck
//! ```

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colloquy::prelude::*;
use colloquy::runtime::logging::{Component, LoggingBuilder};
use serde::Deserialize;
use tracing::{Level, error, info, warn};

// ============================================================================
// Profanity filter plugin
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilterConfig {
    banned: Vec<String>,
}

struct ProfanityFilter {
    banned: Vec<String>,
}

impl ProfanityFilter {
    fn create(ctx: &PluginContext) -> Result<Arc<dyn Middleware>, BoxError> {
        let config: FilterConfig = ctx.config()?;
        Ok(Arc::new(Self {
            banned: config
                .banned
                .into_iter()
                .map(|word| word.to_lowercase())
                .collect(),
        }))
    }
}

#[async_trait]
impl Middleware for ProfanityFilter {
    async fn run(&self, _event: &str, payload: &mut Payload) -> MiddlewareFlow {
        let text = payload["data"]["text"]
            .as_str()
            .unwrap_or_default()
            .to_lowercase();
        if self.banned.iter().any(|word| text.contains(word.as_str())) {
            MiddlewareFlow::Reject
        } else {
            MiddlewareFlow::Continue
        }
    }
}

/// Vetoes outgoing messages that contain a banned word.
static PROFANITY: PluginDescriptor = define_plugin! {
    name: "profanity",
    middleware: {
        location: Emit,
        types: [Chat],
        events: ["message"],
        create: ProfanityFilter::create,
    },
    metadata: {
        version: "0.1.0",
        desc: "Drops messages containing banned words",
    },
};

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "chat-room", about = "Two clients chatting over an in-memory network")]
struct Args {
    /// Words the profanity filter rejects.
    #[arg(long = "banned", default_value = "darn")]
    banned: Vec<String>,

    /// Chat both clients join.
    #[arg(long, default_value = "lobby")]
    room: String,

    /// Number of history hits to look up at the end.
    #[arg(long, default_value_t = 10)]
    search_limit: usize,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Log every middleware chain run.
    #[arg(long)]
    trace_pipelines: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Must happen before the engines are created; they keep the first
    // subscriber installed.
    LoggingBuilder::new()
        .with_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .component(Component::Transport, Level::WARN)
        .trace_pipelines(args.trace_pipelines)
        .init();

    let network = MemoryNetwork::new();
    let ada = ChatEngine::new(Arc::new(network.client("ada")));
    let bob = ChatEngine::new(Arc::new(network.client("bob")));

    ada.register_proto_plugin(
        ObjectType::Chat,
        PluginRegistration::new(&PROFANITY).configuration(json!({ "banned": args.banned })),
    )?;

    ada.connect(Some(json!({ "status": "typing away" }))).await?;
    bob.connect(Some(json!({ "status": "listening" }))).await?;

    // ========================================================================
    // Bob listens
    // ========================================================================

    let bob_room = bob.chat(&args.room)?;
    bob_room.emitter().on("message", |event: &EmittedEvent| {
        info!(
            "[{}] {}: {}",
            event.emitter, event.data["sender"], event.data["data"]["text"]
        );
    });
    bob_room.connect().await?;

    for user in bob_room.participants().await? {
        info!(user = %user.uuid(), "Present in {}", bob_room.name());
    }

    // ========================================================================
    // Ada talks
    // ========================================================================

    let ada_room = ada.chat(&args.room)?;
    ada_room.connect().await?;

    for text in ["hello bob", "this darn filter", "how are you?"] {
        match ada_room.publish("message", json!({ "text": text })).await? {
            EmitOutcome::Published { timetoken, .. } => {
                info!(%timetoken, "Sent {text:?}");
            }
            EmitOutcome::Rejected { plugin } => {
                warn!(plugin = %plugin, "Message {text:?} was blocked");
            }
        }
    }

    let tracker = ada_room.emit("message", json!({ "text": "see you later" }))?;
    match tracker.outcome().await {
        EventOutcome::Emitted { timetoken, .. } => info!(%timetoken, "Farewell delivered"),
        other => error!(outcome = ?other, "Farewell not delivered"),
    }

    // Give bob's inbound loop a moment to drain.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // ========================================================================
    // Bob searches the room's history
    // ========================================================================

    let search = bob_room.search(
        SearchQuery::new()
            .event("message")
            .sender("ada")
            .limit(args.search_limit),
    )?;
    match search.finished().await {
        SearchStatus::Finished { found } => {
            info!(found, "History search finished");
            for hit in search.results() {
                info!("  #{} {}", hit["timetoken"], hit["data"]["text"]);
            }
        }
        status => error!(status = ?status, "History search did not finish"),
    }

    ada.destroy().await;
    bob.destroy().await;
    Ok(())
}
