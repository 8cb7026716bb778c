//! Boundary with the transport collaborator.
//!
//! The chat core never moves bytes itself. It asks a [`ChatTransport`] to
//! send, upload or download, and learns about progress through
//! [`TransportEvent`]s published on an [`EventBus`].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use huddle_shared::protocol::{FileTransferSetting, TransferProgress, TransportEvent};
use huddle_shared::types::{
    ChatPrivilege, ClientUploadId, Message, MessageId, OutgoingFile, Receiver, ReceiverId,
    ReceiverSelection, Sender, TransferStatus,
};
use huddle_shared::TransportError;

use crate::bus::EventBus;

/// One-shot cancellation callback supplied by the transport.
pub struct CancelHandle(Box<dyn FnOnce() + Send>);

impl CancelHandle {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Request cancellation. Consumes the handle.
    pub fn cancel(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CancelHandle")
    }
}

/// Returned by `send_file` once the upload is registered server side.
#[derive(Debug)]
pub struct UploadTicket {
    pub client_upload_id: ClientUploadId,
    pub cancel: CancelHandle,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver a text message. Resolves with the message as recorded by the server.
    async fn send(&self, text: &str, receiver: ReceiverId) -> Result<Message, TransportError>;

    /// Start an upload. Resolves once it is registered, not once complete.
    ///
    /// Progress events for the upload must carry `receiver.user_id` and
    /// `receiver.user_guid` unchanged so they match the tracked entry.
    async fn send_file(
        &self,
        file: &OutgoingFile,
        receiver: &ReceiverSelection,
    ) -> Result<UploadTicket, TransportError>;

    async fn download_file(&self, message_id: &MessageId, url: &str)
        -> Result<(), TransportError>;

    /// Moderator only; enforced by the transport.
    fn set_privilege(&self, level: ChatPrivilege) -> Result<(), TransportError>;

    fn is_file_transfer_enabled(&self) -> bool;

    fn file_transfer_setting(&self) -> FileTransferSetting;
}

#[derive(Debug, Default)]
struct LoopbackState {
    next_message: u64,
    next_upload: u64,
    fail_next: Option<TransportError>,
    sent: Vec<(String, ReceiverId)>,
    downloads: Vec<MessageId>,
}

/// In-memory transport that confirms everything locally.
///
/// Sends come back as messages authored by the local user, uploads get
/// sequential ids, and cancelling an upload publishes the confirming
/// `Cancel` progress event on the bus.
pub struct LoopbackTransport {
    local: Sender,
    events: EventBus<TransportEvent>,
    setting: FileTransferSetting,
    file_transfer_enabled: bool,
    state: Mutex<LoopbackState>,
    cancelled: Arc<Mutex<Vec<ClientUploadId>>>,
}

impl LoopbackTransport {
    pub fn new(local: Sender, events: EventBus<TransportEvent>) -> Self {
        Self {
            local,
            events,
            setting: FileTransferSetting::default(),
            file_transfer_enabled: true,
            state: Mutex::new(LoopbackState::default()),
            cancelled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_setting(mut self, setting: FileTransferSetting) -> Self {
        self.setting = setting;
        self
    }

    pub fn with_file_transfer(mut self, enabled: bool) -> Self {
        self.file_transfer_enabled = enabled;
        self
    }

    pub fn events(&self) -> &EventBus<TransportEvent> {
        &self.events
    }

    /// Make the next network call fail with `error`.
    pub fn fail_next(&self, error: TransportError) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = Some(error);
        }
    }

    /// Texts handed to `send`, in call order.
    pub fn sent(&self) -> Vec<(String, ReceiverId)> {
        self.state
            .lock()
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    pub fn downloads(&self) -> Vec<MessageId> {
        self.state
            .lock()
            .map(|s| s.downloads.clone())
            .unwrap_or_default()
    }

    pub fn cancelled(&self) -> Vec<ClientUploadId> {
        self.cancelled
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn begin(&self) -> Result<std::sync::MutexGuard<'_, LoopbackState>, TransportError> {
        let mut state = self.state.lock().map_err(|_| TransportError::Closed)?;
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl ChatTransport for LoopbackTransport {
    async fn send(&self, text: &str, receiver: ReceiverId) -> Result<Message, TransportError> {
        let mut state = self.begin()?;
        state.next_message += 1;
        state.sent.push((text.to_string(), receiver));
        let id = MessageId(format!("loopback-{}", state.next_message));
        debug!(%id, %receiver, "Loopback send");

        Ok(Message {
            id,
            sender: self.local.clone(),
            sender_guid: String::new(),
            receiver: Receiver {
                user_id: receiver,
                name: String::new(),
            },
            message: text.to_string(),
            file: None,
            timestamp: Utc::now(),
            broadcast_scope: None,
        })
    }

    async fn send_file(
        &self,
        file: &OutgoingFile,
        receiver: &ReceiverSelection,
    ) -> Result<UploadTicket, TransportError> {
        let mut state = self.begin()?;
        state.next_upload += 1;
        let client_upload_id = ClientUploadId(state.next_upload);
        drop(state);

        let events = self.events.clone();
        let cancelled = self.cancelled.clone();
        let progress = TransferProgress {
            file_name: file.name.clone(),
            file_size: file.size,
            receiver_id: receiver.user_id,
            receiver_guid: receiver.user_guid.clone(),
            progress: 0,
            status: TransferStatus::Cancel,
            client_upload_id: Some(client_upload_id),
            message_id: None,
        };
        let cancel = CancelHandle::new(move || {
            if let Ok(mut list) = cancelled.lock() {
                list.push(client_upload_id);
            }
            events.publish(TransportEvent::UploadProgress(progress));
        });

        debug!(upload_id = %client_upload_id, file = %file.name, "Loopback upload registered");
        Ok(UploadTicket {
            client_upload_id,
            cancel,
        })
    }

    async fn download_file(
        &self,
        message_id: &MessageId,
        url: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.begin()?;
        state.downloads.push(message_id.clone());
        debug!(%message_id, url, "Loopback download requested");
        Ok(())
    }

    fn set_privilege(&self, level: ChatPrivilege) -> Result<(), TransportError> {
        drop(self.begin()?);
        info!(privilege = ?level, "Loopback privilege change");
        self.events
            .publish(TransportEvent::PrivilegeChanged { privilege: level });
        Ok(())
    }

    fn is_file_transfer_enabled(&self) -> bool {
        self.file_transfer_enabled
    }

    fn file_transfer_setting(&self) -> FileTransferSetting {
        self.setting.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_shared::types::UserId;

    fn loopback() -> LoopbackTransport {
        LoopbackTransport::new(
            Sender {
                user_id: UserId(1),
                name: "me".into(),
            },
            EventBus::new(16),
        )
    }

    #[tokio::test]
    async fn test_send_confirms_as_local_user() {
        let transport = loopback();
        let message = transport
            .send("hi", ReceiverId::User(UserId(42)))
            .await
            .unwrap();
        assert_eq!(message.sender.user_id, UserId(1));
        assert_eq!(message.receiver.user_id, ReceiverId::User(UserId(42)));
        assert_eq!(message.message, "hi");
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_applies_once() {
        let transport = loopback();
        transport.fail_next(TransportError::Network("down".into()));
        let err = transport.send("hi", ReceiverId::Everyone).await.unwrap_err();
        assert_eq!(err, TransportError::Network("down".into()));
        assert!(transport.send("hi", ReceiverId::Everyone).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_publishes_confirmation() {
        let transport = loopback();
        let mut sub = transport.events().subscribe();
        let file = OutgoingFile {
            name: "a.png".into(),
            size: 3,
            mime_type: String::new(),
        };
        let receiver = ReceiverSelection {
            user_id: ReceiverId::User(UserId(7)),
            name: "carol".into(),
            user_guid: "guid-7".into(),
        };
        let ticket = transport.send_file(&file, &receiver).await.unwrap();
        assert_eq!(ticket.client_upload_id, ClientUploadId(1));

        ticket.cancel.cancel();
        assert_eq!(transport.cancelled(), vec![ClientUploadId(1)]);
        match sub.try_next() {
            Some(TransportEvent::UploadProgress(p)) => {
                assert_eq!(p.status, TransferStatus::Cancel);
                assert_eq!(p.file_name, "a.png");
                assert_eq!(p.receiver_id, ReceiverId::User(UserId(7)));
                assert_eq!(p.receiver_guid, "guid-7");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
