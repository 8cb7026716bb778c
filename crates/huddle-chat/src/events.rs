//! State changes published to the presentation shell.

use serde::Serialize;
use uuid::Uuid;

use huddle_shared::types::{
    ChatPrivilege, Message, MessageId, ReceiverSelection, TransferDirection, TransferStatus,
    UserId,
};

use crate::matcher::TransferKey;
use crate::timeline::{NewMessageToast, PendingSend};
use crate::transfers::{PendingFileTransfer, RetryCandidate};

/// One observable change of a [`ChatSession`](crate::session::ChatSession).
///
/// Serialised as `{"event": "...", "payload": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ChatUpdate {
    MessageAppended(MessageAppendedPayload),
    UnreadChanged { count: u32 },
    NewMessageIndicator { visible: bool },
    ScrollTo { index: usize },
    /// Rows were removed; cached heights are gone.
    Remeasure,
    Toast(NewMessageToast),
    PrivilegeChanged(PrivilegePayload),
    ReceiverChanged { receiver: ReceiverSelection },
    RosterChanged { user_id: UserId, present: bool },
    SendPending { local_id: Uuid },
    SendConfirmed { local_id: Uuid, message_id: MessageId },
    SendFailed { local_id: Uuid, error: String },
    TransferChanged(TransferPayload),
    Notice(Notice),
    SessionEnded { cancelled_uploads: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageAppendedPayload {
    pub index: usize,
    pub message_id: MessageId,
    pub inbound: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivilegePayload {
    pub previous: ChatPrivilege,
    pub current: ChatPrivilege,
    pub receiver: ReceiverSelection,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferPayload {
    #[serde(flatten)]
    pub key: TransferKey,
    pub direction: TransferDirection,
    pub progress: u8,
    pub status: TransferStatus,
    /// `false` once the transfer reached a terminal status.
    pub tracked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// A user-visible message about a failure or refusal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }
}

/// Everything the shell needs to render the chat panel.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub pending_sends: Vec<PendingSend>,
    pub unread: u32,
    pub toast: Option<NewMessageToast>,
    pub new_message_indicator: bool,
    pub is_at_bottom: bool,
    pub draft: String,
    pub receiver: ReceiverSelection,
    pub receiver_options: Vec<ReceiverSelection>,
    pub privilege: ChatPrivilege,
    pub can_compose: bool,
    pub file_transfer_enabled: bool,
    pub transfers: Vec<PendingFileTransfer>,
    pub retry_candidates: Vec<RetryCandidate>,
}
