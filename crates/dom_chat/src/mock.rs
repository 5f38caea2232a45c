//! Mock chat backend for testing.
//!
//! Provides a scriptable implementation of the [`ChatApi`] trait for use in
//! tests without a running backend. Every call is captured for verification.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::api::{ApiResult, ChatApi, PushSource};
use crate::error::TransportError;
use crate::stream::{STREAM_END_SENTINEL, STREAM_ERROR_PREFIX};
use crate::types::{Message, MessageRole, Session, UploadFile, UploadedDocument};

/// Scripted behavior of one reply stream.
#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    /// Error returned instead of opening the connection
    pub refuse: Option<TransportError>,
    /// Items pushed in order
    pub items: Vec<ApiResult<String>>,
    /// Keep the connection open after the last item instead of ending the body
    pub hold_open: bool,
}

impl StreamScript {
    pub fn tokens(tokens: &[&str]) -> Self {
        Self {
            items: tokens.iter().map(|t| Ok(t.to_string())).collect(),
            ..Self::default()
        }
    }

    /// A connection that cannot be opened.
    pub fn refuse(error: TransportError) -> Self {
        Self {
            refuse: Some(error),
            ..Self::default()
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.items.push(Ok(token.into()));
        self
    }

    /// Push the end-of-stream sentinel.
    pub fn end(self) -> Self {
        self.token(STREAM_END_SENTINEL)
    }

    /// Push a server-reported error payload.
    pub fn error_payload(self, message: &str) -> Self {
        self.token(format!("{}{}", STREAM_ERROR_PREFIX, message))
    }

    /// Fail the connection.
    pub fn transport_error(mut self, error: TransportError) -> Self {
        self.items.push(Err(error));
        self
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    fn into_source(self) -> PushSource {
        let items = futures::stream::iter(self.items);
        if self.hold_open {
            Box::pin(items.chain(futures::stream::pending()))
        } else {
            Box::pin(items)
        }
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub session_id: Option<String>,
    /// Method-specific detail: title, message content, file name, research flag
    pub detail: Option<String>,
}

/// Mock chat backend.
///
/// Sessions and messages are generated with sequential ids. Streams follow
/// the queued [`StreamScript`]s; when the queue is empty an opened stream
/// stays silent and open. Uploads succeed unless a result was scripted for
/// the file name, and can be held back with [`MockChatApi::gate_upload`].
#[derive(Clone)]
pub struct MockChatApi {
    counter: Arc<AtomicUsize>,
    create_failure: Arc<RwLock<Option<TransportError>>>,
    reset_failure: Arc<RwLock<Option<TransportError>>>,
    send_failure: Arc<RwLock<Option<TransportError>>>,
    streams: Arc<RwLock<VecDeque<StreamScript>>>,
    upload_results: Arc<RwLock<HashMap<String, ApiResult<UploadedDocument>>>>,
    upload_gates: Arc<RwLock<HashMap<String, Arc<Notify>>>>,
    sessions: Arc<RwLock<Vec<Session>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl Default for MockChatApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChatApi {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self {
            counter: Arc::new(AtomicUsize::new(0)),
            create_failure: Arc::new(RwLock::new(None)),
            reset_failure: Arc::new(RwLock::new(None)),
            send_failure: Arc::new(RwLock::new(None)),
            streams: Arc::new(RwLock::new(VecDeque::new())),
            upload_results: Arc::new(RwLock::new(HashMap::new())),
            upload_gates: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(Vec::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue the script for the next opened stream.
    pub fn add_stream(self, script: StreamScript) -> Self {
        self.streams.write().push_back(script);
        self
    }

    /// Make `create_session` fail (or succeed again with `None`).
    pub fn fail_create_session(&self, error: Option<TransportError>) {
        *self.create_failure.write() = error;
    }

    pub fn fail_reset_session(&self, error: Option<TransportError>) {
        *self.reset_failure.write() = error;
    }

    pub fn fail_send_message(&self, error: Option<TransportError>) {
        *self.send_failure.write() = error;
    }

    /// Script the upload result for a file name.
    pub fn upload_result(self, file_name: impl Into<String>, result: ApiResult<UploadedDocument>) -> Self {
        self.upload_results.write().insert(file_name.into(), result);
        self
    }

    /// Hold the upload of `file_name` until the returned gate is notified.
    pub fn gate_upload(&self, file_name: impl Into<String>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.upload_gates.write().insert(file_name.into(), gate.clone());
        gate
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn record_call(&self, method: &str, session_id: Option<&str>, detail: Option<String>) {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            session_id: session_id.map(str::to_string),
            detail,
        });
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn new_session(&self, title: Option<&str>) -> Session {
        let session = Session {
            id: self.next_id("session"),
            user_id: "user-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            title: title.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.sessions.write().push(session.clone());
        session
    }

    fn document_for(&self, file: &UploadFile) -> UploadedDocument {
        UploadedDocument {
            id: self.next_id("doc"),
            tenant_id: "tenant-1".to_string(),
            file_name: file.name.clone(),
            file_path: format!("/uploads/{}", file.name),
            file_type: file.content_type.clone(),
            file_size: Some(format!("{}B", file.size())),
            uploaded_by_user_id: Some("user-1".to_string()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn create_session(&self, title: Option<&str>) -> ApiResult<Session> {
        self.record_call("create_session", None, title.map(str::to_string));
        if let Some(err) = self.create_failure.read().clone() {
            return Err(err);
        }
        Ok(self.new_session(title))
    }

    async fn reset_session(&self, session_id: &str) -> ApiResult<Session> {
        self.record_call("reset_session", Some(session_id), None);
        if let Some(err) = self.reset_failure.read().clone() {
            return Err(err);
        }
        for session in self.sessions.write().iter_mut() {
            if session.id == session_id {
                session.is_active = false;
            }
        }
        Ok(self.new_session(None))
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        role: MessageRole,
    ) -> ApiResult<Message> {
        self.record_call("send_message", Some(session_id), Some(content.to_string()));
        if let Some(err) = self.send_failure.read().clone() {
            return Err(err);
        }
        let now = Utc::now();
        Ok(Message {
            id: self.next_id("msg"),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            raw_llm_response: None,
            sources: Vec::new(),
            created_at: now,
            updated_at: Some(now),
        })
    }

    async fn open_stream(&self, session_id: &str, research_mode: bool) -> ApiResult<PushSource> {
        self.record_call("open_stream", Some(session_id), Some(research_mode.to_string()));
        let script = self
            .streams
            .write()
            .pop_front()
            .unwrap_or_else(|| StreamScript::default().hold_open());
        if let Some(err) = script.refuse.clone() {
            return Err(err);
        }
        Ok(script.into_source())
    }

    async fn upload_file(
        &self,
        file: &UploadFile,
        session_id: Option<&str>,
    ) -> ApiResult<UploadedDocument> {
        self.record_call("upload_file", session_id, Some(file.name.clone()));

        let gate = self.upload_gates.read().get(&file.name).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self.upload_results.read().get(&file.name).cloned();
        match scripted {
            Some(result) => result,
            None => Ok(self.document_for(file)),
        }
    }

    async fn list_sessions(&self) -> ApiResult<Vec<Session>> {
        self.record_call("list_sessions", None, None);
        Ok(self.sessions.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sessions_and_calls() {
        let mock = MockChatApi::new();

        let first = mock.create_session(Some("New chat")).await.unwrap();
        let second = mock.reset_session(&first.id).await.unwrap();
        assert_ne!(first.id, second.id);

        let sessions = mock.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(!sessions[0].is_active);

        assert_eq!(mock.call_count(), 3);
        let calls = mock.get_method_calls("create_session");
        assert_eq!(calls[0].detail.as_deref(), Some("New chat"));
    }

    #[tokio::test]
    async fn test_mock_failure_simulation() {
        let mock = MockChatApi::new();
        mock.fail_send_message(Some(TransportError::new(500, "db down")));

        let result = mock.send_message("s-1", "hello", MessageRole::User).await;
        assert_eq!(result.unwrap_err().status, 500);

        mock.fail_send_message(None);
        let message = mock.send_message("s-1", "hello", MessageRole::User).await.unwrap();
        assert_eq!(message.content, "hello");
    }

    #[tokio::test]
    async fn test_mock_stream_script() {
        let mock = MockChatApi::new().add_stream(StreamScript::tokens(&["a"]).end());

        let items: Vec<_> = mock.open_stream("s-1", true).await.unwrap().collect().await;
        let payloads: Vec<_> = items.into_iter().map(|i| i.unwrap()).collect();
        assert_eq!(payloads, vec!["a", STREAM_END_SENTINEL]);

        let calls = mock.get_method_calls("open_stream");
        assert_eq!(calls[0].detail.as_deref(), Some("true"));
    }
}
