use thiserror::Error;

use crate::types::UserId;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Chat is disabled by the host")]
    ChatDisabled,

    #[error("Direct messages are disabled by the host")]
    DirectMessagesDisabled,

    #[error("Unknown receiver: {0}")]
    UnknownReceiver(UserId),

    #[error("Unknown transfer: {0}")]
    UnknownTransfer(String),

    #[error("Unknown message: {0}")]
    UnknownMessage(String),
}

/// Rejections raised locally before anything reaches the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File type not allowed: {extension}")]
    FileTypeNotAllowed { extension: String },

    #[error("File transfer is disabled")]
    FileTransferDisabled,
}

/// Failures reported by the transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Transport closed")]
    Closed,
}

impl ChatError {
    /// Whether the failure happened before any network call was made.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ChatError::from(ValidationError::FileTooLarge { size: 10, max: 5 });
        assert_eq!(
            err.to_string(),
            "Validation error: File too large: 10 bytes (max 5)"
        );
        assert!(err.is_local());

        let err = ChatError::from(TransportError::Network("reset".into()));
        assert_eq!(err.to_string(), "Transport error: Network error: reset");
        assert!(!err.is_local());
    }
}
