//! Message timeline store.
//!
//! Owns the ordered message list, the composition draft, the selected
//! receiver, the active privilege and the unread/toast state. Messages are
//! appended in arrival order and never reordered, edited or removed while
//! the session lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use huddle_shared::types::{
    ChatPrivilege, FileInfo, Message, MessageId, Receiver, ReceiverId, ReceiverSelection, UserId,
};
use huddle_shared::{ChatError, Result};

/// Where a message landed after `append_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Index of the new row.
    pub index: usize,
    /// Whether the message was authored by someone other than the local user.
    pub inbound: bool,
}

/// Result of a privilege transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeChange {
    pub previous: ChatPrivilege,
    pub current: ChatPrivilege,
    /// The selected receiver was forced back to "Everyone".
    pub receiver_reset: bool,
}

/// Payload for the "new message" toast shown by the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessageToast {
    pub message_id: MessageId,
    pub sender: String,
    pub snippet: String,
}

/// A locally staged send awaiting the transport's confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSend {
    pub local_id: Uuid,
    pub text: String,
    pub receiver: ReceiverSelection,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChatStore {
    local_user: UserId,
    messages: Vec<Message>,
    draft: String,
    receiver: ReceiverSelection,
    privilege: ChatPrivilege,
    unread: u32,
    latest_inbound: Option<usize>,
    pending_sends: Vec<PendingSend>,
}

impl ChatStore {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            messages: Vec::new(),
            draft: String::new(),
            receiver: ReceiverSelection::everyone(),
            privilege: ChatPrivilege::default(),
            unread: 0,
            latest_inbound: None,
            pending_sends: Vec::new(),
        }
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn find(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn receiver(&self) -> &ReceiverSelection {
        &self.receiver
    }

    pub fn privilege(&self) -> ChatPrivilege {
        self.privilege
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn pending_sends(&self) -> &[PendingSend] {
        &self.pending_sends
    }

    /// Append a message at the tail.
    ///
    /// Broadcast receivers are normalised to "Everyone"; the original
    /// sentinel is kept in `broadcast_scope`.
    pub fn append_message(&mut self, message: Message) -> AppendOutcome {
        let message = normalize_receiver(message);
        let inbound = message.sender.user_id != self.local_user;
        let index = self.messages.len();

        debug!(
            index,
            id = %message.id,
            sender = %message.sender.user_id,
            receiver = %message.receiver.user_id,
            inbound,
            "Appending message"
        );

        self.messages.push(message);
        if inbound {
            self.unread = self.unread.saturating_add(1);
            self.latest_inbound = Some(index);
        }
        AppendOutcome { index, inbound }
    }

    /// Apply a moderator privilege change.
    ///
    /// `NoOne` clears the draft, the unread counter and the toast pointer.
    /// Any level that forbids direct messages resets the receiver. History
    /// is never touched.
    pub fn set_privilege(&mut self, level: ChatPrivilege) -> PrivilegeChange {
        let previous = self.privilege;
        self.privilege = level;

        if level == ChatPrivilege::NoOne {
            self.unread = 0;
            self.latest_inbound = None;
            self.draft.clear();
        }

        let receiver_reset = !level.allows_direct() && !self.receiver.is_everyone();
        if receiver_reset {
            self.receiver = ReceiverSelection::everyone();
        }

        debug!(?previous, current = ?level, receiver_reset, "Chat privilege changed");
        PrivilegeChange {
            previous,
            current: level,
            receiver_reset,
        }
    }

    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<()> {
        if !self.privilege.allows_chat() {
            return Err(ChatError::ChatDisabled);
        }
        self.draft = text.into();
        Ok(())
    }

    /// Select the receiver of the next outgoing message.
    ///
    /// Rejected while chat is disabled. A direct receiver under
    /// `EveryonePublicly` is forced back to "Everyone".
    pub fn set_receiver(&mut self, selection: ReceiverSelection) -> Result<()> {
        if !self.privilege.allows_chat() {
            return Err(ChatError::ChatDisabled);
        }
        if !selection.is_everyone() && !self.privilege.allows_direct() {
            self.receiver = ReceiverSelection::everyone();
            return Err(ChatError::DirectMessagesDisabled);
        }
        self.receiver = selection;
        Ok(())
    }

    /// Reset the receiver to "Everyone", returning whether it changed.
    pub fn reset_receiver(&mut self) -> bool {
        if self.receiver.is_everyone() {
            return false;
        }
        self.receiver = ReceiverSelection::everyone();
        true
    }

    pub fn reset_unread(&mut self) {
        self.unread = 0;
    }

    pub fn latest_inbound(&self) -> Option<&Message> {
        self.latest_inbound.and_then(|i| self.messages.get(i))
    }

    /// Toast for the most recent inbound message, if any.
    pub fn toast(&self, snippet_chars: usize) -> Option<NewMessageToast> {
        let message = self.latest_inbound()?;
        Some(NewMessageToast {
            message_id: message.id.clone(),
            sender: message.sender.name.clone(),
            snippet: snippet(&message.message, message.file.as_ref(), snippet_chars),
        })
    }

    pub fn dismiss_toast(&mut self) {
        self.latest_inbound = None;
    }

    /// Stage an outgoing text as a provisional send.
    pub fn stage_send(&mut self, text: impl Into<String>) -> Result<PendingSend> {
        if !self.privilege.allows_chat() {
            return Err(ChatError::ChatDisabled);
        }
        let pending = PendingSend {
            local_id: Uuid::new_v4(),
            text: text.into(),
            receiver: self.receiver.clone(),
            staged_at: Utc::now(),
        };
        self.pending_sends.push(pending.clone());
        Ok(pending)
    }

    /// Confirm a staged send with the message returned by the transport.
    ///
    /// Completes even if the privilege changed while the send was in
    /// flight. The draft is cleared only if it still holds the sent text.
    pub fn commit_send(&mut self, local_id: Uuid, confirmed: Message) -> Result<AppendOutcome> {
        let pending = self
            .take_pending(local_id)
            .ok_or_else(|| ChatError::UnknownMessage(local_id.to_string()))?;
        if self.draft == pending.text {
            self.draft.clear();
        }
        Ok(self.append_message(confirmed))
    }

    /// Drop a staged send after the transport rejected it. The draft is kept.
    pub fn rollback_send(&mut self, local_id: Uuid) -> Option<PendingSend> {
        let pending = self.take_pending(local_id);
        if pending.is_none() {
            warn!(%local_id, "Rollback for unknown pending send");
        }
        pending
    }

    /// Forget every message. Only used on session teardown.
    pub fn clear_history(&mut self) -> usize {
        let removed = self.messages.len();
        self.messages.clear();
        self.pending_sends.clear();
        self.latest_inbound = None;
        self.unread = 0;
        removed
    }

    fn take_pending(&mut self, local_id: Uuid) -> Option<PendingSend> {
        let pos = self.pending_sends.iter().position(|p| p.local_id == local_id)?;
        Some(self.pending_sends.remove(pos))
    }
}

/// Canonicalise both broadcast sentinels to `{name: "Everyone", user_id: Everyone}`.
pub fn normalize_receiver(mut message: Message) -> Message {
    if let Some(scope) = message.receiver.user_id.broadcast_scope() {
        message.broadcast_scope.get_or_insert(scope);
        message.receiver = Receiver::everyone();
    }
    message
}

fn snippet(text: &str, file: Option<&FileInfo>, max_chars: usize) -> String {
    let source = match file {
        Some(file) if text.trim().is_empty() => file.name.as_str(),
        _ => text,
    };
    let mut chars = source.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Receiver shown for a direct message to `id`.
pub fn direct_receiver(id: UserId, name: impl Into<String>) -> Receiver {
    Receiver {
        user_id: ReceiverId::User(id),
        name: name.into(),
    }
}
