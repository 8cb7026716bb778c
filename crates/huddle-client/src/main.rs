//! # huddle-replay
//!
//! Drives a Huddle chat session from a JSON-lines script and prints the
//! resulting snapshot, the same state a chat panel would render.
//!
//! ```text
//! huddle-replay [SCRIPT]      # reads stdin when SCRIPT is omitted
//! ```

mod replay;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use huddle_chat::{ChatConfig, ChatSession, ChatUpdate, EventBus, LoopbackTransport};
use huddle_shared::constants::APP_NAME;
use huddle_shared::types::{Participant, Sender, UserId};

use crate::replay::Replayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var), on stderr so stdout
    //    carries only the snapshot
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("huddle_replay=info,huddle_chat=debug,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("Starting {} replay v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ChatConfig::from_env();
    info!(?config, "Loaded configuration");
    let local = local_user();

    // -----------------------------------------------------------------------
    // 3. Join a session over the loopback transport
    // -----------------------------------------------------------------------
    let bus = EventBus::new(config.event_capacity);
    let mut transport_events = bus.subscribe();
    let transport = LoopbackTransport::new(
        Sender {
            user_id: local.user_id,
            name: local.display_name.clone(),
        },
        bus,
    );
    let mut session = ChatSession::join(config, local, Arc::new(transport));
    let mut updates = session.updates();

    // -----------------------------------------------------------------------
    // 4. Replay the script
    // -----------------------------------------------------------------------
    let input: Box<dyn AsyncBufRead + Unpin> = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {path}"))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let stats = Replayer::new(&mut session, &mut transport_events)
        .run(input)
        .await?;

    let notices = updates
        .drain()
        .into_iter()
        .filter(|u| matches!(u, ChatUpdate::Notice(_)))
        .count();
    info!(
        events = stats.events,
        commands = stats.commands,
        refused = stats.refused,
        notices,
        "Replay finished"
    );

    // -----------------------------------------------------------------------
    // 5. Print the snapshot and leave
    // -----------------------------------------------------------------------
    let snapshot = session.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    let cancelled = session.leave();
    info!(cancelled, "Session closed");
    Ok(())
}

/// The replaying user. Env: `HUDDLE_LOCAL_USER_ID` (default `1`) and
/// `HUDDLE_LOCAL_USER_NAME` (default `me`).
fn local_user() -> Participant {
    let user_id = match std::env::var("HUDDLE_LOCAL_USER_ID") {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "Invalid HUDDLE_LOCAL_USER_ID, using 1");
            1
        }),
        Err(_) => 1,
    };
    Participant {
        user_id: UserId(user_id),
        display_name: std::env::var("HUDDLE_LOCAL_USER_NAME").unwrap_or_else(|_| "me".into()),
        user_guid: String::new(),
    }
}
