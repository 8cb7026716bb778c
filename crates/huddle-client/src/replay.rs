//! Replays a JSON-lines script against a chat session.
//!
//! Each line is either a transport event (`{"type": "message-received", ...}`)
//! or a local user action (`{"command": "send"}`). Actions refused by the
//! session are logged and the replay carries on.

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use huddle_chat::{ChatSession, ScrollMetrics, Subscription, TransferKey};
use huddle_shared::protocol::TransportEvent;
use huddle_shared::types::{ChatPrivilege, MessageId, OutgoingFile, ReceiverId};

/// A local user action.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ReplayCommand {
    Draft { text: String },
    Select { receiver: ReceiverId },
    Send,
    Upload { file: OutgoingFile },
    Download { message_id: MessageId },
    Cancel { key: TransferKey },
    Retry { key: TransferKey },
    Scroll(ScrollMetrics),
    Focus { focused: bool },
    JumpToLatest,
    SetPrivilege { privilege: ChatPrivilege },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplayLine {
    Command(ReplayCommand),
    Event(TransportEvent),
}

/// Counters reported once the script is exhausted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    pub commands: usize,
    pub refused: usize,
}

pub struct Replayer<'a> {
    session: &'a mut ChatSession,
    transport_events: &'a mut Subscription<TransportEvent>,
    stats: ReplayStats,
}

impl<'a> Replayer<'a> {
    pub fn new(
        session: &'a mut ChatSession,
        transport_events: &'a mut Subscription<TransportEvent>,
    ) -> Self {
        Self {
            session,
            transport_events,
            stats: ReplayStats::default(),
        }
    }

    /// Read every line of `input` and apply it.
    pub async fn run<R>(mut self, input: R) -> anyhow::Result<ReplayStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut number = 0usize;
        while let Some(line) = lines.next_line().await.context("Failed to read input")? {
            number += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(line)
                .with_context(|| format!("Invalid replay line {number}"))?;
            self.apply(parsed).await;
        }
        Ok(self.stats)
    }

    pub async fn apply(&mut self, line: ReplayLine) {
        match line {
            ReplayLine::Event(event) => {
                self.stats.events += 1;
                self.session.handle_event(event);
            }
            ReplayLine::Command(command) => {
                self.stats.commands += 1;
                debug!(?command, "Applying command");
                if let Err(e) = self.execute(command).await {
                    self.stats.refused += 1;
                    warn!(error = %e, "Command refused");
                }
            }
        }
        // The loopback answers some commands with events of its own.
        self.stats.events += self.session.drain_events(self.transport_events);
    }

    async fn execute(&mut self, command: ReplayCommand) -> huddle_shared::Result<()> {
        match command {
            ReplayCommand::Draft { text } => self.session.set_draft(text)?,
            ReplayCommand::Select { receiver } => {
                self.session.select_receiver(receiver)?;
            }
            ReplayCommand::Send => {
                self.session.send_text().await?;
            }
            ReplayCommand::Upload { file } => {
                self.session.send_file(file).await?;
            }
            ReplayCommand::Download { message_id } => {
                self.session.download(&message_id).await?;
            }
            ReplayCommand::Cancel { key } => {
                self.session.cancel_transfer(&key)?;
            }
            ReplayCommand::Retry { key } => {
                self.session.retry_transfer(&key).await?;
            }
            ReplayCommand::Scroll(metrics) => {
                self.session.on_scroll(metrics);
            }
            ReplayCommand::Focus { focused } => self.session.set_focused(focused),
            ReplayCommand::JumpToLatest => {
                self.session.jump_to_latest();
            }
            ReplayCommand::SetPrivilege { privilege } => {
                self.session.request_privilege(privilege)?
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use huddle_chat::{ChatConfig, EventBus, LoopbackTransport};
    use huddle_shared::types::{Participant, Sender, UserId};

    use super::*;

    const SCRIPT: &str = r#"
# bob joins and says hello
{"type":"participant-joined","participant":{"user_id":42,"display_name":"bob","user_guid":"g42"}}
{"type":"message-received","message":{"id":"m1","sender":{"user_id":42,"name":"bob"},"receiver":{"user_id":{"kind":"everyone_publicly"},"name":""},"message":"hello","timestamp":"2024-01-01T00:00:00Z"}}
{"command":"select","receiver":{"kind":"user","user_id":42}}
{"command":"draft","text":"hi bob"}
{"command":"send"}
{"command":"upload","file":{"name":"a.png","size":10,"type":"image/png"}}
{"command":"set-privilege","privilege":"no_one"}
{"command":"draft","text":"too late"}
"#;

    fn session() -> (ChatSession, Subscription<TransportEvent>) {
        let bus = EventBus::new(32);
        let events = bus.subscribe();
        let transport = LoopbackTransport::new(
            Sender {
                user_id: UserId(1),
                name: "me".into(),
            },
            bus,
        );
        let local = Participant {
            user_id: UserId(1),
            display_name: "me".into(),
            user_guid: String::new(),
        };
        let session = ChatSession::join(ChatConfig::default(), local, Arc::new(transport));
        (session, events)
    }

    #[tokio::test]
    async fn test_replay_script() {
        let (mut session, mut events) = session();
        let stats = Replayer::new(&mut session, &mut events)
            .run(SCRIPT.as_bytes())
            .await
            .unwrap();

        // The privilege change comes back from the loopback as an event.
        assert_eq!(
            stats,
            ReplayStats {
                events: 3,
                commands: 6,
                refused: 1,
            }
        );
        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[1].receiver.name, "bob");
        assert_eq!(snapshot.transfers.len(), 1);
        assert_eq!(snapshot.privilege, ChatPrivilege::NoOne);
    }

    #[tokio::test]
    async fn test_invalid_line_is_an_error() {
        let (mut session, mut events) = session();
        let err = Replayer::new(&mut session, &mut events)
            .run("{\"command\":\"fly\"}\n".as_bytes())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
