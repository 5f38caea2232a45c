//! Collaborator contract for the chat backend.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TransportError;
use crate::types::{Message, MessageRole, Session, UploadFile, UploadedDocument};

/// Result type alias for backend calls.
pub type ApiResult<T> = Result<T, TransportError>;

/// A server-push connection.
///
/// Yields one raw payload per pushed event, in arrival order. An `Err` item
/// is a transport failure; the source yields nothing useful after it.
/// Dropping the source closes the connection.
pub type PushSource = Pin<Box<dyn Stream<Item = ApiResult<String>> + Send>>;

/// Chat backend operations used by the session core.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Create a new session, optionally titled.
    async fn create_session(&self, title: Option<&str>) -> ApiResult<Session>;

    /// Replace a session with a fresh one. Archival is the server's concern.
    async fn reset_session(&self, session_id: &str) -> ApiResult<Session>;

    /// Persist a message and return the stored record.
    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        role: MessageRole,
    ) -> ApiResult<Message>;

    /// Open the push connection carrying the assistant's reply to the latest message.
    async fn open_stream(&self, session_id: &str, research_mode: bool) -> ApiResult<PushSource>;

    /// Upload a file, scoped to a session's ephemeral knowledge when `session_id` is given.
    async fn upload_file(
        &self,
        file: &UploadFile,
        session_id: Option<&str>,
    ) -> ApiResult<UploadedDocument>;

    /// Sessions owned by the current user.
    async fn list_sessions(&self) -> ApiResult<Vec<Session>>;
}
