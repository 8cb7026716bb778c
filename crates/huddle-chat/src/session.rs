//! Session-scoped chat state.
//!
//! A [`ChatSession`] is created when the local user joins and consumed when
//! they leave. It owns the timeline, the transfer tracker, the roster and
//! the viewport, applies transport events in arrival order and publishes
//! every observable change as a [`ChatUpdate`]. Nothing here is global: two
//! sessions never share state.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};

use huddle_shared::constants::PROGRESS_COMPLETE;
use huddle_shared::protocol::{TransferProgress, TransportEvent};
use huddle_shared::types::{
    ChatPrivilege, Message, MessageId, OutgoingFile, Participant, ReceiverId, ReceiverSelection,
    TransferDirection, TransferStatus, UserId,
};
use huddle_shared::{ChatError, Result, TransportError, ValidationError};

use crate::bus::{EventBus, Subscription};
use crate::config::ChatConfig;
use crate::events::{
    ChatSnapshot, ChatUpdate, MessageAppendedPayload, Notice, PrivilegePayload, TransferPayload,
};
use crate::matcher::TransferKey;
use crate::receivers::{self, normalize_selection, resolve_receiver, validate_outgoing};
use crate::scroll::{ScrollDecision, ScrollMetrics, TimelineViewport};
use crate::timeline::{direct_receiver, AppendOutcome, ChatStore, PendingSend};
use crate::transfers::{CancelOutcome, ProgressOutcome, RetryCandidate, TransferTracker};
use crate::transport::{ChatTransport, UploadTicket};
use crate::validation::validate_file;

/// Rows rendered above and below the visible window.
const OVERSCAN_ROWS: usize = 3;

pub struct ChatSession {
    config: ChatConfig,
    local: Participant,
    transport: Arc<dyn ChatTransport>,
    store: ChatStore,
    tracker: TransferTracker,
    viewport: TimelineViewport,
    roster: Vec<Participant>,
    focused: bool,
    updates: EventBus<ChatUpdate>,
}

impl ChatSession {
    /// Start a session for `local`. The view starts focused and at the bottom.
    pub fn join(config: ChatConfig, local: Participant, transport: Arc<dyn ChatTransport>) -> Self {
        info!(user_id = %local.user_id, name = %local.display_name, "Joined chat session");
        Self {
            store: ChatStore::new(local.user_id),
            tracker: TransferTracker::new(config.retry_history),
            viewport: TimelineViewport::from_config(&config),
            roster: vec![local.clone()],
            focused: true,
            updates: EventBus::new(config.event_capacity),
            transport,
            local,
            config,
        }
    }

    /// Tear the session down.
    ///
    /// Every upload with a cancel handle is cancelled, history is cleared
    /// and `SessionEnded` is published. Returns the number of cancelled
    /// uploads.
    pub fn leave(mut self) -> usize {
        let cancelled = self.tracker.shutdown();
        let removed = self.store.clear_history();
        if self.viewport.on_rows_changed(0) == ScrollDecision::Remeasure {
            self.emit(ChatUpdate::Remeasure);
        }
        info!(removed, cancelled, "Left chat session");
        self.emit(ChatUpdate::SessionEnded {
            cancelled_uploads: cancelled,
        });
        cancelled
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn local_user(&self) -> &Participant {
        &self.local
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn tracker(&self) -> &TransferTracker {
        &self.tracker
    }

    pub fn viewport(&self) -> &TimelineViewport {
        &self.viewport
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Subscribe to state changes. Dropping the subscription unsubscribes.
    pub fn updates(&self) -> Subscription<ChatUpdate> {
        self.updates.subscribe()
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::MessageReceived { message } => {
                let outcome = self.store.append_message(message);
                self.after_append(outcome);
            }
            TransportEvent::PrivilegeChanged { privilege } => self.apply_privilege(privilege),
            TransportEvent::UploadProgress(progress) => {
                self.apply_progress(TransferDirection::Upload, &progress)
            }
            TransportEvent::DownloadProgress(progress) => {
                self.apply_progress(TransferDirection::Download, &progress)
            }
            TransportEvent::ParticipantJoined { participant } => {
                self.participant_joined(participant)
            }
            TransportEvent::ParticipantLeft { user_id } => self.participant_left(user_id),
        }
    }

    /// Apply every event already buffered on `events`, in order.
    pub fn drain_events(&mut self, events: &mut Subscription<TransportEvent>) -> usize {
        let mut applied = 0;
        while let Some(event) = events.try_next() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    fn after_append(&mut self, outcome: AppendOutcome) {
        if let Some(message) = self.store.messages().get(outcome.index) {
            self.emit(ChatUpdate::MessageAppended(MessageAppendedPayload {
                index: outcome.index,
                message_id: message.id.clone(),
                inbound: outcome.inbound,
            }));
        }

        let had_indicator = self.viewport.has_pending_new_message();
        match self.viewport.on_rows_changed(self.store.len()) {
            ScrollDecision::ScrollTo(index) => {
                if self.focused {
                    self.clear_unread();
                    self.store.dismiss_toast();
                }
                self.emit(ChatUpdate::ScrollTo { index });
            }
            ScrollDecision::ShowIndicator => {
                if !had_indicator {
                    self.emit(ChatUpdate::NewMessageIndicator { visible: true });
                }
            }
            ScrollDecision::Remeasure => self.emit(ChatUpdate::Remeasure),
            ScrollDecision::Unchanged => {}
        }

        if !outcome.inbound {
            return;
        }
        let unread = self.store.unread();
        if unread > 0 {
            self.emit(ChatUpdate::UnreadChanged { count: unread });
        }
        // The toast is for messages the user is not looking at.
        if !self.focused || !self.viewport.is_at_bottom() {
            if let Some(toast) = self.store.toast(self.config.toast_snippet_chars) {
                self.emit(ChatUpdate::Toast(toast));
            }
        }
    }

    fn apply_privilege(&mut self, level: ChatPrivilege) {
        let had_unread = self.store.unread() > 0;
        let change = self.store.set_privilege(level);

        if level == ChatPrivilege::NoOne {
            if had_unread {
                self.emit(ChatUpdate::UnreadChanged { count: 0 });
            }
            if self.viewport.dismiss_indicator() {
                self.emit(ChatUpdate::NewMessageIndicator { visible: false });
            }
        }
        if change.receiver_reset {
            self.emit(ChatUpdate::ReceiverChanged {
                receiver: self.store.receiver().clone(),
            });
        }

        info!(previous = ?change.previous, current = ?change.current, "Chat privilege applied");
        self.emit(ChatUpdate::PrivilegeChanged(PrivilegePayload {
            previous: change.previous,
            current: change.current,
            receiver: self.store.receiver().clone(),
        }));
    }

    fn apply_progress(&mut self, direction: TransferDirection, event: &TransferProgress) {
        match self.tracker.on_progress(direction, event) {
            ProgressOutcome::Ignored => {}
            ProgressOutcome::Inserted | ProgressOutcome::Updated => {
                self.emit_transfer(direction, &TransferKey::from(event));
            }
            ProgressOutcome::Finished(status) => {
                match status {
                    TransferStatus::Fail => {
                        warn!(file = %event.file_name, ?direction, "Transfer failed");
                        self.emit(ChatUpdate::Notice(Notice::warning(format!(
                            "Transfer of {} failed",
                            event.file_name
                        ))));
                    }
                    TransferStatus::Cancel => {
                        info!(file = %event.file_name, ?direction, "Transfer cancelled");
                    }
                    _ => info!(file = %event.file_name, ?direction, "Transfer complete"),
                }
                let progress = if status == TransferStatus::Success {
                    PROGRESS_COMPLETE
                } else {
                    event.progress.min(PROGRESS_COMPLETE)
                };
                self.emit(ChatUpdate::TransferChanged(TransferPayload {
                    key: TransferKey::from(event),
                    direction,
                    progress,
                    status,
                    tracked: false,
                }));
            }
        }
    }

    fn participant_joined(&mut self, participant: Participant) {
        let user_id = participant.user_id;
        match self.roster.iter_mut().find(|p| p.user_id == user_id) {
            Some(existing) => *existing = participant,
            None => self.roster.push(participant),
        }
        debug!(%user_id, roster = self.roster.len(), "Participant joined");
        self.emit(ChatUpdate::RosterChanged {
            user_id,
            present: true,
        });
    }

    fn participant_left(&mut self, user_id: UserId) {
        let before = self.roster.len();
        self.roster.retain(|p| p.user_id != user_id);
        if self.roster.len() == before {
            return;
        }
        debug!(%user_id, roster = self.roster.len(), "Participant left");
        self.emit(ChatUpdate::RosterChanged {
            user_id,
            present: false,
        });

        let privilege = self.store.privilege();
        if normalize_selection(privilege, &self.roster, self.store.receiver()).is_some()
            && self.store.reset_receiver()
        {
            info!(%user_id, "Selected receiver left, falling back to everyone");
            self.emit(ChatUpdate::ReceiverChanged {
                receiver: self.store.receiver().clone(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------

    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<()> {
        self.store.set_draft(text)
    }

    /// Receivers currently selectable, "Everyone" first.
    pub fn receiver_options(&self) -> Vec<ReceiverSelection> {
        receivers::receiver_options(self.store.privilege(), &self.roster, self.local.user_id)
    }

    /// Choose the receiver of the next message.
    ///
    /// Under public-only chat a direct receiver is refused and the
    /// selection is forced back to "Everyone".
    pub fn select_receiver(&mut self, receiver: ReceiverId) -> Result<ReceiverSelection> {
        let requested = receiver.user();
        if requested == Some(self.local.user_id) {
            return Err(ChatError::UnknownReceiver(self.local.user_id));
        }

        let selection = match resolve_receiver(self.store.privilege(), &self.roster, requested) {
            Ok(selection) => selection,
            Err(ChatError::DirectMessagesDisabled) => {
                if self.store.reset_receiver() {
                    self.emit(ChatUpdate::ReceiverChanged {
                        receiver: self.store.receiver().clone(),
                    });
                }
                return Err(ChatError::DirectMessagesDisabled);
            }
            Err(err) => return Err(err),
        };

        self.store.set_receiver(selection.clone())?;
        debug!(receiver = %selection.user_id, "Receiver selected");
        self.emit(ChatUpdate::ReceiverChanged {
            receiver: selection.clone(),
        });
        Ok(selection)
    }

    /// Ask the transport to change the chat privilege (moderators only).
    ///
    /// The new level takes effect when the transport's `privilege-changed`
    /// event is applied.
    pub fn request_privilege(&self, level: ChatPrivilege) -> Result<()> {
        self.transport
            .set_privilege(level)
            .map_err(|err| self.reject(err.into()))
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Stage the current draft as a provisional send.
    pub fn begin_send(&mut self) -> Result<PendingSend> {
        if !self.store.privilege().allows_chat() {
            return Err(ChatError::ChatDisabled);
        }
        let text = self.store.draft().to_string();
        validate_outgoing(&text, false).map_err(|err| self.reject(err.into()))?;

        let pending = self.store.stage_send(text)?;
        debug!(local_id = %pending.local_id, receiver = %pending.receiver.user_id, "Send staged");
        self.emit(ChatUpdate::SendPending {
            local_id: pending.local_id,
        });
        Ok(pending)
    }

    /// Commit or roll back a staged send with the transport's answer.
    pub fn finish_send(
        &mut self,
        pending: &PendingSend,
        result: std::result::Result<Message, TransportError>,
    ) -> Result<MessageId> {
        match result {
            Ok(mut message) => {
                if message.receiver.name.is_empty() {
                    if let Some(id) = message.receiver.user_id.user() {
                        message.receiver = direct_receiver(id, pending.receiver.name.clone());
                    }
                }
                let message_id = message.id.clone();
                let outcome = self.store.commit_send(pending.local_id, message)?;
                info!(%message_id, receiver = %pending.receiver.user_id, "Message sent");
                self.after_append(outcome);
                self.emit(ChatUpdate::SendConfirmed {
                    local_id: pending.local_id,
                    message_id: message_id.clone(),
                });
                Ok(message_id)
            }
            Err(err) => {
                self.store.rollback_send(pending.local_id);
                warn!(local_id = %pending.local_id, error = %err, "Send failed, draft kept");
                self.emit(ChatUpdate::SendFailed {
                    local_id: pending.local_id,
                    error: err.to_string(),
                });
                Err(self.reject(err.into()))
            }
        }
    }

    /// Send the current draft to the selected receiver.
    pub async fn send_text(&mut self) -> Result<MessageId> {
        let pending = self.begin_send()?;
        let result = self
            .transport
            .send(&pending.text, pending.receiver.user_id)
            .await;
        self.finish_send(&pending, result)
    }

    // ------------------------------------------------------------------
    // File transfers
    // ------------------------------------------------------------------

    /// Validate `file` and register the upload to the selected receiver.
    ///
    /// Nothing is tracked if validation fails.
    pub fn begin_upload(&mut self, file: &OutgoingFile) -> Result<TransferKey> {
        let receiver = self.store.receiver().clone();
        self.begin_upload_to(file, receiver)
    }

    /// Graft the transport's ticket onto the upload, or drop it on failure.
    ///
    /// Returns `false` when the upload already ended before its ticket
    /// arrived; the ticket's cancel handle is dropped in that case.
    pub fn finish_upload(
        &mut self,
        key: &TransferKey,
        result: std::result::Result<UploadTicket, TransportError>,
    ) -> Result<bool> {
        match result {
            Ok(ticket) => {
                let upload_id = ticket.client_upload_id;
                let attached = self.tracker.attach_upload(key, upload_id, ticket.cancel);
                if !attached {
                    info!(
                        key = %key,
                        %upload_id,
                        "Upload ended before its ticket, cancel handle dropped"
                    );
                }
                Ok(attached)
            }
            Err(err) => {
                if self.tracker.abandon(TransferDirection::Upload, key).is_some() {
                    self.emit_transfer_end(TransferDirection::Upload, key, TransferStatus::Fail);
                }
                Err(self.reject(err.into()))
            }
        }
    }

    /// Upload `file` to the selected receiver.
    pub async fn send_file(&mut self, file: OutgoingFile) -> Result<TransferKey> {
        let receiver = self.store.receiver().clone();
        let key = self.begin_upload_to(&file, receiver.clone())?;
        let result = self.transport.send_file(&file, &receiver).await;
        self.finish_upload(&key, result)?;
        Ok(key)
    }

    /// Download the attachment of `message_id`.
    pub async fn download(&mut self, message_id: &MessageId) -> Result<TransferKey> {
        let message = self
            .store
            .find(message_id)
            .ok_or_else(|| ChatError::UnknownMessage(message_id.to_string()))?;
        let file = message
            .file
            .clone()
            .ok_or_else(|| ChatError::UnknownTransfer(format!("no file on message {message_id}")))?;
        let key = TransferKey::new(
            file.name.clone(),
            file.size,
            ReceiverId::User(message.sender.user_id),
            message.sender_guid.clone(),
        );

        if !self.transport.is_file_transfer_enabled() {
            return Err(self.reject(ValidationError::FileTransferDisabled.into()));
        }

        self.tracker.register_download(key.clone(), message_id.clone());
        self.emit_transfer(TransferDirection::Download, &key);

        match self.transport.download_file(message_id, &file.url).await {
            Ok(()) => {
                info!(key = %key, %message_id, "Download requested");
                Ok(key)
            }
            Err(err) => {
                if self.tracker.abandon(TransferDirection::Download, &key).is_some() {
                    self.emit_transfer_end(TransferDirection::Download, &key, TransferStatus::Fail);
                }
                Err(self.reject(err.into()))
            }
        }
    }

    /// Request cancellation; the entry stays until the transport confirms.
    pub fn cancel_transfer(&mut self, key: &TransferKey) -> Result<CancelOutcome> {
        let direction = self
            .tracker
            .direction_of(key)
            .ok_or_else(|| ChatError::UnknownTransfer(key.to_string()))?;
        let outcome = self.tracker.cancel(direction, key)?;
        if outcome == CancelOutcome::Requested {
            self.emit_transfer(direction, key);
        }
        Ok(outcome)
    }

    /// Re-issue a transfer that ended in `Fail` or `Cancel`.
    pub async fn retry_transfer(&mut self, key: &TransferKey) -> Result<TransferKey> {
        let candidate = self
            .tracker
            .latest_retry(key)
            .cloned()
            .ok_or_else(|| ChatError::UnknownTransfer(key.to_string()))?;
        info!(key = %key, direction = ?candidate.direction, "Retrying transfer");

        match candidate.direction {
            TransferDirection::Upload => {
                let file = candidate.outgoing_file();
                let receiver = self.selection_for(&candidate.key)?;
                let key = self.begin_upload_to(&file, receiver.clone())?;
                let result = self.transport.send_file(&file, &receiver).await;
                self.finish_upload(&key, result)?;
                Ok(key)
            }
            TransferDirection::Download => {
                let message_id = candidate
                    .message_id
                    .clone()
                    .ok_or_else(|| ChatError::UnknownTransfer(key.to_string()))?;
                let new_key = self.download(&message_id).await?;
                // Server-initiated downloads may have been keyed differently.
                self.tracker
                    .take_retry(TransferDirection::Download, &candidate.key);
                Ok(new_key)
            }
        }
    }

    /// Forget a retry candidate without retrying it.
    pub fn dismiss_retry(&mut self, key: &TransferKey) -> Option<RetryCandidate> {
        let direction = self.tracker.latest_retry(key)?.direction;
        self.tracker.take_retry(direction, key)
    }

    fn begin_upload_to(
        &mut self,
        file: &OutgoingFile,
        receiver: ReceiverSelection,
    ) -> Result<TransferKey> {
        let privilege = self.store.privilege();
        if !privilege.allows_chat() {
            return Err(ChatError::ChatDisabled);
        }
        if !receiver.is_everyone() && !privilege.allows_direct() {
            return Err(ChatError::DirectMessagesDisabled);
        }
        validate_file(
            file,
            self.transport.is_file_transfer_enabled(),
            &self.transport.file_transfer_setting(),
        )
        .map_err(|err| self.reject(err.into()))?;

        let key = self.tracker.register_upload(file, &receiver);
        info!(key = %key, "Upload registered");
        self.emit_transfer(TransferDirection::Upload, &key);
        Ok(key)
    }

    fn selection_for(&self, key: &TransferKey) -> Result<ReceiverSelection> {
        let Some(user_id) = key.receiver_id.user() else {
            return Ok(ReceiverSelection::everyone());
        };
        self.roster
            .iter()
            .find(|p| p.user_id == user_id)
            .map(ReceiverSelection::from)
            .ok_or(ChatError::UnknownReceiver(user_id))
    }

    // ------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------

    /// Record a scroll event. Reaching the bottom clears the unread counter
    /// and the indicator.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        let had_indicator = self.viewport.has_pending_new_message();
        let at_bottom = self.viewport.on_scroll(metrics);
        if at_bottom {
            if had_indicator {
                self.emit(ChatUpdate::NewMessageIndicator { visible: false });
            }
            self.clear_unread();
        }
        at_bottom
    }

    pub fn record_row_height(&mut self, index: usize, height: f64) -> bool {
        self.viewport.record_height(index, height)
    }

    /// Rows to render for the given scroll window, with overscan.
    pub fn visible_rows(&self, scroll_top: f64, viewport_height: f64) -> Range<usize> {
        self.viewport
            .visible_range(scroll_top, viewport_height, OVERSCAN_ROWS)
    }

    /// Explicit "jump to latest": scroll to the newest row and mark all read.
    pub fn jump_to_latest(&mut self) -> Option<usize> {
        let had_indicator = self.viewport.has_pending_new_message();
        let target = self.viewport.jump_to_latest();
        if had_indicator {
            self.emit(ChatUpdate::NewMessageIndicator { visible: false });
        }
        self.clear_unread();
        self.store.dismiss_toast();
        if let Some(index) = target {
            self.emit(ChatUpdate::ScrollTo { index });
        }
        target
    }

    /// Track window focus. Gaining focus marks everything read.
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        if !focused {
            return;
        }
        self.clear_unread();
        if self.viewport.dismiss_indicator() {
            self.emit(ChatUpdate::NewMessageIndicator { visible: false });
        }
        self.store.dismiss_toast();
    }

    pub fn dismiss_toast(&mut self) {
        self.store.dismiss_toast();
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> ChatSnapshot {
        let privilege = self.store.privilege();
        ChatSnapshot {
            messages: self.store.messages().to_vec(),
            pending_sends: self.store.pending_sends().to_vec(),
            unread: self.store.unread(),
            toast: self.store.toast(self.config.toast_snippet_chars),
            new_message_indicator: self.viewport.has_pending_new_message(),
            is_at_bottom: self.viewport.is_at_bottom(),
            draft: self.store.draft().to_string(),
            receiver: self.store.receiver().clone(),
            receiver_options: self.receiver_options(),
            privilege,
            can_compose: privilege.allows_chat(),
            file_transfer_enabled: self.transport.is_file_transfer_enabled(),
            transfers: self.tracker.all(),
            retry_candidates: self.tracker.retry_candidates().cloned().collect(),
        }
    }

    fn clear_unread(&mut self) {
        if self.store.unread() > 0 {
            self.store.reset_unread();
            self.emit(ChatUpdate::UnreadChanged { count: 0 });
        }
    }

    fn emit_transfer(&self, direction: TransferDirection, key: &TransferKey) {
        if let Some(entry) = self.tracker.get(direction, key) {
            self.emit(ChatUpdate::TransferChanged(TransferPayload {
                key: key.clone(),
                direction,
                progress: entry.progress,
                status: entry.status,
                tracked: true,
            }));
        }
    }

    fn emit_transfer_end(
        &self,
        direction: TransferDirection,
        key: &TransferKey,
        status: TransferStatus,
    ) {
        self.emit(ChatUpdate::TransferChanged(TransferPayload {
            key: key.clone(),
            direction,
            progress: 0,
            status,
            tracked: false,
        }));
    }

    /// Publish a notice for `err` and hand it back.
    fn reject(&self, err: ChatError) -> ChatError {
        self.emit(ChatUpdate::Notice(Notice::warning(err.to_string())));
        err
    }

    fn emit(&self, update: ChatUpdate) {
        self.updates.publish(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use huddle_shared::types::{Receiver, Sender};

    use crate::transport::LoopbackTransport;

    const ME: UserId = UserId(1);

    fn me() -> Participant {
        Participant {
            user_id: ME,
            display_name: "me".into(),
            user_guid: "guid-1".into(),
        }
    }

    fn bob() -> Participant {
        Participant {
            user_id: UserId(42),
            display_name: "bob".into(),
            user_guid: "guid-42".into(),
        }
    }

    fn session() -> ChatSession {
        let local = me();
        let transport = LoopbackTransport::new(
            Sender {
                user_id: local.user_id,
                name: local.display_name.clone(),
            },
            EventBus::new(16),
        );
        ChatSession::join(ChatConfig::default(), local, Arc::new(transport))
    }

    fn inbound(id: &str, from: &Participant, text: &str) -> TransportEvent {
        TransportEvent::MessageReceived {
            message: Message {
                id: MessageId(id.to_string()),
                sender: Sender {
                    user_id: from.user_id,
                    name: from.display_name.clone(),
                },
                sender_guid: from.user_guid.clone(),
                receiver: Receiver::everyone(),
                message: text.to_string(),
                file: None,
                timestamp: Utc::now(),
                broadcast_scope: None,
            },
        }
    }

    #[test]
    fn test_focused_at_bottom_reads_immediately() {
        let mut session = session();
        let mut updates = session.updates();
        session.handle_event(inbound("m1", &bob(), "hello"));

        assert_eq!(session.store().unread(), 0);
        assert!(session.snapshot().toast.is_none());
        let events = updates.drain();
        assert!(events
            .iter()
            .any(|u| matches!(u, ChatUpdate::ScrollTo { index: 0 })));
        assert!(!events.iter().any(|u| matches!(u, ChatUpdate::Toast(_))));
    }

    #[test]
    fn test_unfocused_counts_and_toasts() {
        let mut session = session();
        session.set_focused(false);
        let mut updates = session.updates();
        session.handle_event(inbound("m1", &bob(), "hello"));
        session.handle_event(inbound("m2", &bob(), "again"));

        assert_eq!(session.store().unread(), 2);
        let toast = session.snapshot().toast.unwrap();
        assert_eq!(toast.snippet, "again");
        assert!(updates
            .drain()
            .iter()
            .any(|u| matches!(u, ChatUpdate::Toast(t) if t.sender == "bob")));

        session.set_focused(true);
        assert_eq!(session.store().unread(), 0);
        assert!(session.snapshot().toast.is_none());
    }

    #[test]
    fn test_roster_leave_resets_selection() {
        let mut session = session();
        session.handle_event(TransportEvent::ParticipantJoined {
            participant: bob(),
        });
        assert_eq!(session.receiver_options().len(), 2);
        session.select_receiver(ReceiverId::User(UserId(42))).unwrap();

        let mut updates = session.updates();
        session.handle_event(TransportEvent::ParticipantLeft {
            user_id: UserId(42),
        });
        assert!(session.store().receiver().is_everyone());
        assert!(updates
            .drain()
            .iter()
            .any(|u| matches!(u, ChatUpdate::ReceiverChanged { receiver } if receiver.is_everyone())));
    }

    #[test]
    fn test_cannot_select_self_or_stranger() {
        let mut session = session();
        assert!(matches!(
            session.select_receiver(ReceiverId::User(ME)),
            Err(ChatError::UnknownReceiver(ME))
        ));
        assert!(matches!(
            session.select_receiver(ReceiverId::User(UserId(9))),
            Err(ChatError::UnknownReceiver(UserId(9)))
        ));
        assert!(session
            .select_receiver(ReceiverId::EveryonePublicly)
            .unwrap()
            .is_everyone());
    }

    #[test]
    fn test_no_one_clears_indicator() {
        let mut session = session();
        for i in 0..5 {
            session.handle_event(inbound(&format!("m{i}"), &bob(), "x"));
        }
        session.on_scroll(ScrollMetrics {
            scroll_top: 0.0,
            viewport_height: 100.0,
            scroll_height: 500.0,
        });
        session.handle_event(inbound("m5", &bob(), "y"));
        assert!(session.viewport().has_pending_new_message());
        assert_eq!(session.store().unread(), 1);

        session.handle_event(TransportEvent::PrivilegeChanged {
            privilege: ChatPrivilege::NoOne,
        });
        let snapshot = session.snapshot();
        assert!(!snapshot.new_message_indicator);
        assert_eq!(snapshot.unread, 0);
        assert!(!snapshot.can_compose);
        assert!(snapshot.receiver_options.is_empty());
        assert_eq!(snapshot.messages.len(), 6);
    }

    #[test]
    fn test_empty_draft_is_rejected_with_notice() {
        let mut session = session();
        let mut updates = session.updates();
        assert!(matches!(
            session.begin_send(),
            Err(ChatError::Validation(ValidationError::EmptyMessage))
        ));
        assert!(session.store().pending_sends().is_empty());
        assert!(updates
            .drain()
            .iter()
            .any(|u| matches!(u, ChatUpdate::Notice(_))));
    }

    #[test]
    fn test_leave_publishes_session_ended() {
        let mut session = session();
        session.handle_event(inbound("m1", &bob(), "hello"));
        let mut updates = session.updates();
        assert_eq!(session.leave(), 0);

        let events = updates.drain();
        assert!(events.iter().any(|u| matches!(u, ChatUpdate::Remeasure)));
        assert!(matches!(
            events.last(),
            Some(ChatUpdate::SessionEnded { cancelled_uploads: 0 })
        ));
    }
}
