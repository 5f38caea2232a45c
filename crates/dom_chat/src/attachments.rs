//! Attachment upload tracking.
//!
//! One [`Attachment`] per file the user picks. Each runs its own upload task,
//! so uploads proceed in parallel and settle in any order:
//!
//! ```text
//! pending ──(size ok)──▶ uploading ──▶ uploaded
//!    │                       │
//!    └──(too large)──▶ failed ◀──┘
//! ```
//!
//! Status only moves forward. Removing an attachment deletes it from the set
//! and aborts its upload; an outcome that still arrives for it is discarded.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiResult, ChatApi};
use crate::classify::classify;
use crate::error::DomainError;
use crate::types::{UploadFile, UploadedDocument};

/// Hard ceiling on upload size: 5 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Client-local attachment identifier
pub type AttachmentId = String;

/// Upload status of an attachment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

impl AttachmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Failed)
    }

    /// Whether `next` is a legal forward transition from this status.
    pub fn can_advance_to(&self, next: AttachmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploading)
                | (Self::Pending, Self::Failed)
                | (Self::Uploading, Self::Uploaded)
                | (Self::Uploading, Self::Failed)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
        }
    }
}

/// A file attached to the current session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub file_name: String,
    /// Size in bytes
    pub file_size: u64,
    pub status: AttachmentStatus,
    /// Server document id, set once uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DomainError>,
}

impl Attachment {
    fn pending(file: &UploadFile) -> Self {
        Self {
            id: format!("att-{}", uuid::Uuid::new_v4()),
            file_name: file.name.clone(),
            file_size: file.size(),
            status: AttachmentStatus::Pending,
            document_id: None,
            error: None,
        }
    }

    /// Move to `next` if that is a forward transition.
    pub fn advance(&mut self, next: AttachmentStatus) -> bool {
        if !self.status.can_advance_to(next) {
            warn!(
                attachment = %self.id,
                from = self.status.label(),
                to = next.label(),
                "Rejected attachment status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    fn fail(&mut self, error: DomainError) {
        if self.advance(AttachmentStatus::Failed) {
            self.error = Some(error);
        }
    }
}

/// Result of one upload task.
#[derive(Debug)]
pub struct UploadOutcome {
    pub attachment_id: AttachmentId,
    pub result: ApiResult<UploadedDocument>,
}

/// What applying an upload outcome did.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadSettled {
    /// The attachment reached a terminal status
    Applied(Attachment),
    /// The attachment was removed before its upload finished
    Discarded(AttachmentId),
}

/// Tracks every attachment of the current session and their upload tasks.
pub struct AttachmentTracker {
    attachments: Vec<Attachment>,
    tasks: HashMap<AttachmentId, JoinHandle<()>>,
    max_bytes: u64,
    tx: mpsc::UnboundedSender<UploadOutcome>,
    rx: mpsc::UnboundedReceiver<UploadOutcome>,
}

impl Default for AttachmentTracker {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_BYTES)
    }
}

impl AttachmentTracker {
    /// Create a tracker with a size limit, capped at [`MAX_UPLOAD_BYTES`].
    pub fn new(max_bytes: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            attachments: Vec::new(),
            tasks: HashMap::new(),
            max_bytes: max_bytes.min(MAX_UPLOAD_BYTES),
            tx,
            rx,
        }
    }

    /// Attachments in the order they were added.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn get(&self, id: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.id == id)
    }

    /// At least one attachment is mid-upload.
    pub fn is_uploading(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.status == AttachmentStatus::Uploading)
    }

    /// Upload tasks whose outcome has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Add a file and start uploading it to `session_id`'s ephemeral scope.
    ///
    /// A file over the size ceiling fails validation immediately and never
    /// reaches the server. Must be called from within a Tokio runtime.
    pub fn start(&mut self, file: UploadFile, api: Arc<dyn ChatApi>, session_id: &str) -> AttachmentId {
        let mut attachment = Attachment::pending(&file);
        let id = attachment.id.clone();

        if file.size() > self.max_bytes {
            info!(file = %file.name, size = file.size(), "Attachment exceeds the upload limit");
            attachment.fail(
                DomainError::validation(format!(
                    "{} is larger than the {} upload limit",
                    file.name,
                    format_file_size(self.max_bytes)
                ))
                .with_details(json!({ "size": file.size(), "limit": self.max_bytes })),
            );
            self.attachments.push(attachment);
            return id;
        }

        attachment.advance(AttachmentStatus::Uploading);
        self.attachments.push(attachment);

        let tx = self.tx.clone();
        let task_id = id.clone();
        let session_id = session_id.to_string();
        let task = tokio::spawn(async move {
            let result = api.upload_file(&file, Some(&session_id)).await;
            let _ = tx.send(UploadOutcome {
                attachment_id: task_id,
                result,
            });
        });
        self.tasks.insert(id.clone(), task);

        debug!(attachment = %id, "Upload started");
        id
    }

    /// Remove an attachment at any status, aborting its upload if one is running.
    pub fn remove(&mut self, id: &str) -> bool {
        if let Some(task) = self.tasks.remove(id) {
            task.abort();
        }
        let before = self.attachments.len();
        self.attachments.retain(|a| a.id != id);
        before != self.attachments.len()
    }

    /// Drop every attachment and abort all uploads.
    pub fn clear(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
        self.attachments.clear();
    }

    /// Wait for the next upload outcome and apply it. Cancel-safe.
    pub async fn next_settled(&mut self) -> Option<UploadSettled> {
        let outcome = self.rx.recv().await?;
        Some(self.apply(outcome))
    }

    /// Apply an upload outcome to its attachment.
    pub fn apply(&mut self, outcome: UploadOutcome) -> UploadSettled {
        self.tasks.remove(&outcome.attachment_id);

        let position = self
            .attachments
            .iter()
            .position(|a| a.id == outcome.attachment_id);
        let Some(index) = position else {
            debug!(attachment = %outcome.attachment_id, "Discarding outcome of a removed attachment");
            return UploadSettled::Discarded(outcome.attachment_id);
        };
        let attachment = &mut self.attachments[index];

        match outcome.result {
            Ok(document) => {
                if attachment.advance(AttachmentStatus::Uploaded) {
                    info!(file = %attachment.file_name, document = %document.id, "Attachment uploaded");
                    attachment.document_id = Some(document.id);
                }
            }
            Err(e) => {
                warn!(file = %attachment.file_name, error = %e, "Attachment upload failed");
                attachment.fail(classify(&e));
            }
        }

        UploadSettled::Applied(attachment.clone())
    }
}

impl Drop for AttachmentTracker {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Human-readable size, base 1024: `0 Bytes`, `1.5 KB`, `5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{:.2}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use crate::mock::MockChatApi;

    #[test]
    fn test_transitions_only_move_forward() {
        use AttachmentStatus::*;

        assert!(Pending.can_advance_to(Uploading));
        assert!(Pending.can_advance_to(Failed));
        assert!(Uploading.can_advance_to(Uploaded));
        assert!(Uploading.can_advance_to(Failed));

        assert!(!Uploading.can_advance_to(Pending));
        assert!(!Uploaded.can_advance_to(Uploading));
        assert!(!Failed.can_advance_to(Uploaded));
        assert!(!Pending.can_advance_to(Uploaded));
        assert!(!Uploaded.can_advance_to(Failed));
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(MAX_UPLOAD_BYTES), "5 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
    }

    #[tokio::test]
    async fn test_oversized_file_fails_without_network() {
        let mock = MockChatApi::new();
        let mut tracker = AttachmentTracker::default();

        let file = UploadFile::new("big.pdf", vec![0u8; 6 * 1024 * 1024]);
        let id = tracker.start(file, Arc::new(mock.clone()), "s-1");

        let attachment = tracker.get(&id).unwrap();
        assert_eq!(attachment.status, AttachmentStatus::Failed);
        assert_eq!(attachment.error.as_ref().unwrap().kind, ErrorKind::Validation);
        assert_eq!(tracker.in_flight(), 0);
        assert!(!tracker.is_uploading());
        assert!(!mock.was_called("upload_file"));
    }

    #[tokio::test]
    async fn test_limit_cannot_exceed_ceiling() {
        let mock = MockChatApi::new();
        let mut tracker = AttachmentTracker::new(100 * 1024 * 1024);
        assert_eq!(tracker.max_bytes(), MAX_UPLOAD_BYTES);

        let file = UploadFile::new("big.pdf", vec![0u8; 6 * 1024 * 1024]);
        let id = tracker.start(file, Arc::new(mock.clone()), "s-1");

        let attachment = tracker.get(&id).unwrap();
        assert_eq!(attachment.status, AttachmentStatus::Failed);
        assert_eq!(attachment.error.as_ref().unwrap().kind, ErrorKind::Validation);
        assert!(!mock.was_called("upload_file"));
    }

    #[tokio::test]
    async fn test_exactly_at_limit_is_uploaded() {
        let mock = MockChatApi::new();
        let mut tracker = AttachmentTracker::new(1024);

        let id = tracker.start(UploadFile::new("edge.txt", vec![1u8; 1024]), Arc::new(mock.clone()), "s-1");
        assert_eq!(tracker.get(&id).unwrap().status, AttachmentStatus::Uploading);
        assert!(tracker.is_uploading());

        let settled = tracker.next_settled().await.unwrap();
        match settled {
            UploadSettled::Applied(a) => {
                assert_eq!(a.status, AttachmentStatus::Uploaded);
                assert!(a.document_id.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tracker.in_flight(), 0);

        let calls = mock.get_method_calls("upload_file");
        assert_eq!(calls[0].session_id.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_failed_upload_is_classified() {
        let mock = MockChatApi::new()
            .upload_result("notes.md", Err(TransportError::new(413, "Payload Too Large")));
        let mut tracker = AttachmentTracker::default();

        tracker.start(UploadFile::new("notes.md", b"# notes".to_vec()), Arc::new(mock), "s-1");

        match tracker.next_settled().await.unwrap() {
            UploadSettled::Applied(a) => {
                assert_eq!(a.status, AttachmentStatus::Failed);
                assert_eq!(a.error.unwrap().kind, ErrorKind::Client);
                assert!(a.document_id.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_mid_upload_discards_outcome() {
        let mock = MockChatApi::new();
        let gate = mock.gate_upload("slow.txt");
        let mut tracker = AttachmentTracker::default();

        let id = tracker.start(UploadFile::new("slow.txt", b"abc".to_vec()), Arc::new(mock), "s-1");
        assert!(tracker.remove(&id));
        assert!(tracker.attachments().is_empty());
        assert_eq!(tracker.in_flight(), 0);
        assert!(!tracker.remove(&id));

        gate.notify_one();
        let late = UploadOutcome {
            attachment_id: id.clone(),
            result: Err(TransportError::network("aborted")),
        };
        assert_eq!(tracker.apply(late), UploadSettled::Discarded(id));
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut attachment = Attachment::pending(&UploadFile::new("a.txt", vec![]));
        assert!(attachment.advance(AttachmentStatus::Uploading));
        assert!(attachment.advance(AttachmentStatus::Uploaded));
        assert!(!attachment.advance(AttachmentStatus::Failed));
        assert_eq!(attachment.status, AttachmentStatus::Uploaded);
        assert!(attachment.status.is_terminal());
    }
}
