//! Content-addressed transfer identity.
//!
//! The transport never echoes a client-chosen id on progress callbacks, so a
//! locally registered transfer and a later progress event are correlated on
//! `(file_name, file_size, receiver_id, receiver_guid)`. Two distinct files
//! with identical name, size and receiver in flight at the same time are
//! indistinguishable; the most recent registration wins.

use serde::{Deserialize, Serialize};

use huddle_shared::protocol::TransferProgress;
use huddle_shared::types::ReceiverId;

/// Identity key of a pending transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferKey {
    pub file_name: String,
    pub file_size: u64,
    pub receiver_id: ReceiverId,
    pub receiver_guid: String,
}

impl TransferKey {
    pub fn new(
        file_name: impl Into<String>,
        file_size: u64,
        receiver_id: ReceiverId,
        receiver_guid: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
            receiver_id,
            receiver_guid: receiver_guid.into(),
        }
    }
}

impl From<&TransferProgress> for TransferKey {
    fn from(p: &TransferProgress) -> Self {
        Self::new(
            p.file_name.clone(),
            p.file_size,
            p.receiver_id,
            p.receiver_guid.clone(),
        )
    }
}

impl std::fmt::Display for TransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} bytes) -> {}",
            self.file_name, self.file_size, self.receiver_id
        )?;
        if !self.receiver_guid.is_empty() {
            write!(f, " [{}]", self.receiver_guid)?;
        }
        Ok(())
    }
}

/// Anything that exposes the four identity fields.
pub trait TransferIdentity {
    fn file_name(&self) -> &str;
    fn file_size(&self) -> u64;
    fn receiver_id(&self) -> ReceiverId;
    fn receiver_guid(&self) -> &str;
}

impl TransferIdentity for TransferKey {
    fn file_name(&self) -> &str {
        &self.file_name
    }
    fn file_size(&self) -> u64 {
        self.file_size
    }
    fn receiver_id(&self) -> ReceiverId {
        self.receiver_id
    }
    fn receiver_guid(&self) -> &str {
        &self.receiver_guid
    }
}

impl TransferIdentity for TransferProgress {
    fn file_name(&self) -> &str {
        &self.file_name
    }
    fn file_size(&self) -> u64 {
        self.file_size
    }
    fn receiver_id(&self) -> ReceiverId {
        self.receiver_id
    }
    fn receiver_guid(&self) -> &str {
        &self.receiver_guid
    }
}

/// True iff both sides carry the same identity key.
pub fn is_same_transfer<A, B>(a: &A, b: &B) -> bool
where
    A: TransferIdentity + ?Sized,
    B: TransferIdentity + ?Sized,
{
    a.file_name() == b.file_name()
        && a.file_size() == b.file_size()
        && a.receiver_id() == b.receiver_id()
        && a.receiver_guid() == b.receiver_guid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_shared::types::{TransferStatus, UserId};

    fn progress(name: &str, size: u64, receiver: u32, guid: &str) -> TransferProgress {
        TransferProgress {
            file_name: name.to_string(),
            file_size: size,
            receiver_id: ReceiverId::User(UserId(receiver)),
            receiver_guid: guid.to_string(),
            progress: 10,
            status: TransferStatus::InProgress,
            client_upload_id: None,
            message_id: None,
        }
    }

    #[test]
    fn test_matches_on_all_four_fields() {
        let key = TransferKey::new("a.png", 1024, ReceiverId::User(UserId(7)), "");
        assert!(is_same_transfer(&key, &progress("a.png", 1024, 7, "")));
    }

    #[test]
    fn test_any_field_difference_breaks_match() {
        let key = TransferKey::new("a.png", 1024, ReceiverId::User(UserId(7)), "");
        assert!(!is_same_transfer(&key, &progress("b.png", 1024, 7, "")));
        assert!(!is_same_transfer(&key, &progress("a.png", 1025, 7, "")));
        assert!(!is_same_transfer(&key, &progress("a.png", 1024, 8, "")));
        assert!(!is_same_transfer(&key, &progress("a.png", 1024, 7, "guid-1")));
    }

    #[test]
    fn test_progress_fields_are_ignored() {
        let mut a = progress("a.png", 1024, 7, "");
        let mut b = a.clone();
        a.progress = 0;
        b.progress = 99;
        b.status = TransferStatus::Fail;
        assert!(is_same_transfer(&a, &b));
        assert_eq!(TransferKey::from(&a), TransferKey::from(&b));
    }

    #[test]
    fn test_broadcast_receivers_are_distinct_keys() {
        let everyone = TransferKey::new("a.png", 1, ReceiverId::Everyone, "");
        let publicly = TransferKey::new("a.png", 1, ReceiverId::EveryonePublicly, "");
        assert!(!is_same_transfer(&everyone, &publicly));
    }
}
