use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::EVERYONE_DISPLAY_NAME;

/// Session-scoped participant identifier assigned by the transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u32);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned message identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload id handed back by the transport once `send_file` resolves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClientUploadId(pub u64);

impl std::fmt::Display for ClientUploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upload-{}", self.0)
    }
}

/// Addressee of a message or file transfer.
///
/// `Everyone` and `EveryonePublicly` are the two broadcast sentinels the
/// transport may deliver; the timeline normalises both to `Everyone`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "user_id")]
pub enum ReceiverId {
    Everyone,
    EveryonePublicly,
    User(UserId),
}

impl ReceiverId {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Everyone | Self::EveryonePublicly)
    }

    pub fn user(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            _ => None,
        }
    }

    /// Scope of a broadcast sentinel, `None` for direct receivers.
    pub fn broadcast_scope(&self) -> Option<BroadcastScope> {
        match self {
            Self::Everyone => Some(BroadcastScope::Everyone),
            Self::EveryonePublicly => Some(BroadcastScope::EveryonePublicly),
            Self::User(_) => None,
        }
    }
}

impl std::fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Everyone => f.write_str("everyone"),
            Self::EveryonePublicly => f.write_str("everyone-publicly"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Which broadcast sentinel a message originally carried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastScope {
    Everyone,
    EveryonePublicly,
}

/// Moderator-controlled policy restricting who may message whom.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatPrivilege {
    /// Public and direct messages allowed.
    #[default]
    All,
    /// Chat disabled entirely.
    NoOne,
    /// Only public messages to everyone.
    EveryonePublicly,
}

impl ChatPrivilege {
    pub fn allows_direct(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn allows_chat(&self) -> bool {
        !matches!(self, Self::NoOne)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receiver {
    pub user_id: ReceiverId,
    pub name: String,
}

impl Receiver {
    pub fn everyone() -> Self {
        Self {
            user_id: ReceiverId::Everyone,
            name: EVERYONE_DISPLAY_NAME.to_string(),
        }
    }
}

/// The addressee chosen for the next outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiverSelection {
    pub user_id: ReceiverId,
    pub name: String,
    pub user_guid: String,
}

impl ReceiverSelection {
    pub fn everyone() -> Self {
        Self {
            user_id: ReceiverId::Everyone,
            name: EVERYONE_DISPLAY_NAME.to_string(),
            user_guid: String::new(),
        }
    }

    pub fn is_everyone(&self) -> bool {
        self.user_id.is_broadcast()
    }
}

impl Default for ReceiverSelection {
    fn default() -> Self {
        Self::everyone()
    }
}

impl From<&Participant> for ReceiverSelection {
    fn from(p: &Participant) -> Self {
        Self {
            user_id: ReceiverId::User(p.user_id),
            name: p.display_name.clone(),
            user_guid: p.user_guid.clone(),
        }
    }
}

/// A roster entry as reported by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub user_guid: String,
}

/// Attachment metadata carried by a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    #[serde(default)]
    pub url: String,
}

/// A chat message. Immutable once it enters the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    #[serde(default)]
    pub sender_guid: String,
    pub receiver: Receiver,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
    pub timestamp: DateTime<Utc>,
    /// Broadcast sentinel the message arrived with, kept after the receiver
    /// has been normalised to "Everyone".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_scope: Option<BroadcastScope>,
}

/// Payload for a local file the user wants to send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingFile {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime_type: String,
}

impl OutgoingFile {
    /// Lower-cased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Lifecycle of a file transfer: `Init -> InProgress -> {Success, Fail, Cancel}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Init,
    InProgress,
    Success,
    Fail,
    Cancel,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail | Self::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_sentinels() {
        assert!(ReceiverId::Everyone.is_broadcast());
        assert!(ReceiverId::EveryonePublicly.is_broadcast());
        assert!(!ReceiverId::User(UserId(42)).is_broadcast());
        assert_eq!(ReceiverId::User(UserId(42)).user(), Some(UserId(42)));
    }

    #[test]
    fn test_file_extension() {
        let file = |name: &str| OutgoingFile {
            name: name.to_string(),
            size: 1,
            mime_type: String::new(),
        };
        assert_eq!(file("photo.PNG").extension().as_deref(), Some("png"));
        assert_eq!(file("archive.tar.gz").extension().as_deref(), Some("gz"));
        assert_eq!(file("README").extension(), None);
        assert_eq!(file(".bashrc").extension(), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransferStatus::Init.is_terminal());
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(TransferStatus::Success.is_terminal());
        assert!(TransferStatus::Fail.is_terminal());
        assert!(TransferStatus::Cancel.is_terminal());
    }

    #[test]
    fn test_receiver_id_json_shape() {
        let json = serde_json::to_string(&ReceiverId::User(UserId(7))).unwrap();
        assert_eq!(json, r#"{"kind":"user","user_id":7}"#);
        let back: ReceiverId = serde_json::from_str(r#"{"kind":"everyone_publicly"}"#).unwrap();
        assert_eq!(back, ReceiverId::EveryonePublicly);
    }
}
