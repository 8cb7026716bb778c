//! File transfer tracking.
//!
//! Keeps the in-flight uploads and downloads keyed by [`TransferKey`],
//! advances them as progress events arrive and drops them once a terminal
//! status is reported. Cancellation is cooperative: the entry stays until
//! the transport confirms it with a `Cancel` event.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use huddle_shared::constants::PROGRESS_COMPLETE;
use huddle_shared::protocol::TransferProgress;
use huddle_shared::types::{
    ClientUploadId, MessageId, OutgoingFile, ReceiverSelection, TransferDirection, TransferStatus,
};
use huddle_shared::{ChatError, Result};

use crate::matcher::{is_same_transfer, TransferKey};
use crate::transport::CancelHandle;

/// A locally tracked upload or download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFileTransfer {
    #[serde(flatten)]
    pub key: TransferKey,
    pub direction: TransferDirection,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    /// Assigned once `send_file` resolves; uploads only.
    pub client_upload_id: Option<ClientUploadId>,
    /// Message the file belongs to; downloads only.
    pub message_id: Option<MessageId>,
    /// A cancel was requested and is waiting for confirmation.
    pub cancel_requested: bool,
}

impl PendingFileTransfer {
    fn new(key: TransferKey, direction: TransferDirection) -> Self {
        Self {
            key,
            direction,
            progress: 0,
            status: TransferStatus::Init,
            mime_type: String::new(),
            client_upload_id: None,
            message_id: None,
            cancel_requested: false,
        }
    }
}

/// A transfer that ended in `Fail` or `Cancel` and can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCandidate {
    pub key: TransferKey,
    pub direction: TransferDirection,
    pub status: TransferStatus,
    pub mime_type: String,
    pub message_id: Option<MessageId>,
    pub ended_at: DateTime<Utc>,
}

impl RetryCandidate {
    /// Rebuild the outgoing file descriptor for a failed upload.
    pub fn outgoing_file(&self) -> OutgoingFile {
        OutgoingFile {
            name: self.key.file_name.clone(),
            size: self.key.file_size,
            mime_type: self.mime_type.clone(),
        }
    }
}

/// What a progress event did to the tracked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// First event for an unknown transfer (server-initiated download).
    Inserted,
    /// Progress/status of an existing entry replaced in place.
    Updated,
    /// Terminal status; the entry is gone.
    Finished(TransferStatus),
    /// Terminal status for a transfer that was not tracked.
    Ignored,
}

/// What `cancel` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The transport's cancel handle was invoked.
    Requested,
    /// A cancel is already pending confirmation.
    AlreadyRequested,
    /// No handle is known yet (upload ticket not back, or a download).
    NoHandle,
}

/// Uploads and downloads may share a key, so anything kept outside the
/// per-direction lists is indexed by both.
type Slot = (TransferDirection, TransferKey);

/// Tracks every in-flight transfer of the session.
pub struct TransferTracker {
    uploads: Vec<PendingFileTransfer>,
    downloads: Vec<PendingFileTransfer>,
    cancel_handles: HashMap<Slot, CancelHandle>,
    retry: VecDeque<RetryCandidate>,
    retry_history: usize,
}

impl TransferTracker {
    /// Create an empty tracker remembering up to `retry_history` failures.
    pub fn new(retry_history: usize) -> Self {
        Self {
            uploads: Vec::new(),
            downloads: Vec::new(),
            cancel_handles: HashMap::new(),
            retry: VecDeque::new(),
            retry_history,
        }
    }

    /// Register a local upload before the transport is called.
    ///
    /// A live entry with the same key is replaced (last registration wins)
    /// and its cancel handle forgotten.
    pub fn register_upload(
        &mut self,
        file: &OutgoingFile,
        receiver: &ReceiverSelection,
    ) -> TransferKey {
        let key = TransferKey::new(
            file.name.clone(),
            file.size,
            receiver.user_id,
            receiver.user_guid.clone(),
        );
        let mut entry = PendingFileTransfer::new(key.clone(), TransferDirection::Upload);
        entry.mime_type = file.mime_type.clone();

        let slot = (TransferDirection::Upload, key.clone());
        if self.cancel_handles.remove(&slot).is_some() {
            debug!(key = %key, "Dropped cancel handle of superseded upload");
        }
        self.forget_retry(TransferDirection::Upload, &key);
        Self::upsert(&mut self.uploads, entry);

        debug!(key = %key, "Registered upload");
        key
    }

    /// Register a download requested by the user.
    pub fn register_download(&mut self, key: TransferKey, message_id: MessageId) -> TransferKey {
        let mut entry = PendingFileTransfer::new(key.clone(), TransferDirection::Download);
        entry.message_id = Some(message_id);
        self.forget_retry(TransferDirection::Download, &key);
        Self::upsert(&mut self.downloads, entry);

        debug!(key = %key, "Registered download");
        key
    }

    /// Graft the id and cancel handle returned by `send_file` onto the
    /// existing upload. Returns `false` if the upload already finished.
    pub fn attach_upload(
        &mut self,
        key: &TransferKey,
        client_upload_id: ClientUploadId,
        cancel: CancelHandle,
    ) -> bool {
        match Self::find_mut(&mut self.uploads, key) {
            Some(entry) => {
                entry.client_upload_id = Some(client_upload_id);
                self.cancel_handles
                    .insert((TransferDirection::Upload, key.clone()), cancel);
                debug!(key = %key, upload_id = %client_upload_id, "Attached upload ticket");
                true
            }
            None => {
                debug!(
                    key = %key,
                    upload_id = %client_upload_id,
                    "Upload finished before its ticket arrived"
                );
                false
            }
        }
    }

    /// Drop a transfer whose transport call failed before any progress.
    pub fn abandon(
        &mut self,
        direction: TransferDirection,
        key: &TransferKey,
    ) -> Option<PendingFileTransfer> {
        let list = match direction {
            TransferDirection::Upload => &mut self.uploads,
            TransferDirection::Download => &mut self.downloads,
        };
        let entry = Self::remove(list, key)?;
        self.cancel_handles.remove(&(direction, key.clone()));
        self.remember_failure(&entry, TransferStatus::Fail);
        warn!(key = %key, ?direction, "Transfer abandoned");
        Some(entry)
    }

    /// Apply a progress event.
    pub fn on_progress(
        &mut self,
        direction: TransferDirection,
        event: &TransferProgress,
    ) -> ProgressOutcome {
        let list = match direction {
            TransferDirection::Upload => &mut self.uploads,
            TransferDirection::Download => &mut self.downloads,
        };
        let position = list.iter().position(|e| is_same_transfer(&e.key, event));

        if event.status.is_terminal() {
            let Some(pos) = position else {
                debug!(
                    file = %event.file_name,
                    status = ?event.status,
                    ?direction,
                    "Terminal event for untracked transfer"
                );
                if event.status == TransferStatus::Success {
                    self.retry
                        .retain(|c| c.direction != direction || !is_same_transfer(&c.key, event));
                }
                return ProgressOutcome::Ignored;
            };
            let mut entry = list.remove(pos);
            entry.status = event.status;
            self.cancel_handles.remove(&(direction, entry.key.clone()));

            match event.status {
                TransferStatus::Success => self.forget_retry(direction, &entry.key),
                status => self.remember_failure(&entry, status),
            }
            debug!(key = %entry.key, status = ?event.status, ?direction, "Transfer finished");
            return ProgressOutcome::Finished(event.status);
        }

        let progress = event.progress.min(PROGRESS_COMPLETE);
        match position {
            Some(pos) => {
                let entry = &mut list[pos];
                entry.progress = progress;
                entry.status = event.status;
                if event.client_upload_id.is_some() {
                    entry.client_upload_id = event.client_upload_id;
                }
                if event.message_id.is_some() {
                    entry.message_id = event.message_id.clone();
                }
                ProgressOutcome::Updated
            }
            None => {
                let mut entry = PendingFileTransfer::new(TransferKey::from(event), direction);
                entry.progress = progress;
                entry.status = event.status;
                entry.client_upload_id = event.client_upload_id;
                entry.message_id = event.message_id.clone();
                debug!(key = %entry.key, ?direction, "Tracking transfer from first progress event");
                list.push(entry);
                ProgressOutcome::Inserted
            }
        }
    }

    /// Direction of the tracked transfer for `key`. Uploads win when both
    /// directions track the same key, since only they can be cancelled.
    pub fn direction_of(&self, key: &TransferKey) -> Option<TransferDirection> {
        if self.uploads.iter().any(|e| &e.key == key) {
            Some(TransferDirection::Upload)
        } else if self.downloads.iter().any(|e| &e.key == key) {
            Some(TransferDirection::Download)
        } else {
            None
        }
    }

    /// Ask the transport to cancel a transfer. The entry is kept until a
    /// terminal progress event confirms the cancellation.
    pub fn cancel(
        &mut self,
        direction: TransferDirection,
        key: &TransferKey,
    ) -> Result<CancelOutcome> {
        let list = match direction {
            TransferDirection::Upload => &mut self.uploads,
            TransferDirection::Download => &mut self.downloads,
        };
        let entry = Self::find_mut(list, key)
            .ok_or_else(|| ChatError::UnknownTransfer(key.to_string()))?;

        if entry.cancel_requested {
            return Ok(CancelOutcome::AlreadyRequested);
        }
        match self.cancel_handles.remove(&(direction, key.clone())) {
            Some(handle) => {
                entry.cancel_requested = true;
                handle.cancel();
                debug!(key = %key, ?direction, "Cancel requested");
                Ok(CancelOutcome::Requested)
            }
            None => Ok(CancelOutcome::NoHandle),
        }
    }

    pub fn get(&self, direction: TransferDirection, key: &TransferKey) -> Option<&PendingFileTransfer> {
        let list = match direction {
            TransferDirection::Upload => &self.uploads,
            TransferDirection::Download => &self.downloads,
        };
        list.iter().find(|e| &e.key == key)
    }

    pub fn uploads(&self) -> &[PendingFileTransfer] {
        &self.uploads
    }

    pub fn downloads(&self) -> &[PendingFileTransfer] {
        &self.downloads
    }

    /// All tracked transfers, uploads first (snapshot).
    pub fn all(&self) -> Vec<PendingFileTransfer> {
        self.uploads.iter().chain(&self.downloads).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.uploads.len() + self.downloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retry_candidates(&self) -> impl Iterator<Item = &RetryCandidate> {
        self.retry.iter()
    }

    /// The most recent retry candidate for `key`, in either direction.
    pub fn latest_retry(&self, key: &TransferKey) -> Option<&RetryCandidate> {
        self.retry.iter().rev().find(|c| &c.key == key)
    }

    /// Remove and return the retry candidate for `key` in `direction`.
    pub fn take_retry(
        &mut self,
        direction: TransferDirection,
        key: &TransferKey,
    ) -> Option<RetryCandidate> {
        let pos = self
            .retry
            .iter()
            .position(|c| c.direction == direction && &c.key == key)?;
        self.retry.remove(pos)
    }

    /// Cancel every upload that has a handle and forget all state.
    /// Returns the number of cancellations requested.
    pub fn shutdown(&mut self) -> usize {
        let handles: Vec<_> = self.cancel_handles.drain().collect();
        let count = handles.len();
        for ((direction, key), handle) in handles {
            debug!(key = %key, ?direction, "Cancelling transfer on shutdown");
            handle.cancel();
        }
        self.uploads.clear();
        self.downloads.clear();
        self.retry.clear();
        count
    }

    fn remember_failure(&mut self, entry: &PendingFileTransfer, status: TransferStatus) {
        if self.retry_history == 0 {
            return;
        }
        self.forget_retry(entry.direction, &entry.key);
        if self.retry.len() == self.retry_history {
            self.retry.pop_front();
        }
        self.retry.push_back(RetryCandidate {
            key: entry.key.clone(),
            direction: entry.direction,
            status,
            mime_type: entry.mime_type.clone(),
            message_id: entry.message_id.clone(),
            ended_at: Utc::now(),
        });
    }

    fn forget_retry(&mut self, direction: TransferDirection, key: &TransferKey) {
        self.retry.retain(|c| c.direction != direction || &c.key != key);
    }

    fn upsert(list: &mut Vec<PendingFileTransfer>, entry: PendingFileTransfer) {
        match list.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => list.push(entry),
        }
    }

    fn find_mut<'a>(
        list: &'a mut [PendingFileTransfer],
        key: &TransferKey,
    ) -> Option<&'a mut PendingFileTransfer> {
        list.iter_mut().find(|e| &e.key == key)
    }

    fn remove(list: &mut Vec<PendingFileTransfer>, key: &TransferKey) -> Option<PendingFileTransfer> {
        let pos = list.iter().position(|e| &e.key == key)?;
        Some(list.remove(pos))
    }
}

impl std::fmt::Debug for TransferTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTracker")
            .field("uploads", &self.uploads)
            .field("downloads", &self.downloads)
            .field("cancel_handles", &self.cancel_handles.len())
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for TransferTracker {
    fn default() -> Self {
        Self::new(huddle_shared::constants::DEFAULT_RETRY_HISTORY)
    }
}
