use serde::{Deserialize, Serialize};

use crate::constants::ANY_FILE_TYPE;
use crate::types::{
    ChatPrivilege, ClientUploadId, Message, MessageId, Participant, ReceiverId, TransferStatus,
    UserId,
};

/// Events emitted by the transport collaborator and consumed by the chat core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportEvent {
    /// Inbound chat message
    MessageReceived { message: Message },

    /// Moderator changed the chat privilege
    PrivilegeChanged { privilege: ChatPrivilege },

    /// Progress of a local upload
    UploadProgress(TransferProgress),

    /// Progress of a download
    DownloadProgress(TransferProgress),

    /// A participant joined the session
    ParticipantJoined { participant: Participant },

    /// A participant left the session
    ParticipantLeft { user_id: UserId },
}

/// A progress callback for one file transfer.
///
/// Carries no id shared with the local registration; it is matched on
/// `(file_name, file_size, receiver_id, receiver_guid)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub file_name: String,
    pub file_size: u64,
    pub receiver_id: ReceiverId,
    #[serde(default)]
    pub receiver_guid: String,
    #[serde(default)]
    pub progress: u8,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_upload_id: Option<ClientUploadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

/// Host-configured limits for file transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferSetting {
    /// Maximum file size in bytes
    pub size_limit: u64,
    /// Comma separated extensions, or `*` for any type
    pub type_limit: String,
}

impl FileTransferSetting {
    /// Allowed lower-cased extensions without dots, `None` meaning any type.
    pub fn allowed_extensions(&self) -> Option<Vec<String>> {
        if self.type_limit.trim() == ANY_FILE_TYPE {
            return None;
        }
        Some(
            self.type_limit
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        )
    }
}

impl Default for FileTransferSetting {
    fn default() -> Self {
        Self {
            size_limit: 512 * 1024 * 1024, // 512 MiB
            type_limit: ANY_FILE_TYPE.to_string(),
        }
    }
}
