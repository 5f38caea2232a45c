//! Session orchestrator.
//!
//! The main entry point for chat operations. It owns the current session and
//! message history, drives turn submission, and owns the [`StreamConsumer`]
//! and [`AttachmentTracker`]. Those two only report outcomes; every state
//! mutation happens here, on `&mut self`.
//!
//! Inbound stream and upload events are processed by awaiting
//! [`SessionOrchestrator::next_event`]. After every mutation a fresh
//! [`ChatSnapshot`] is published for presentation layers.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::ChatApi;
use crate::attachments::{Attachment, AttachmentId, AttachmentTracker, UploadSettled};
use crate::classify::{classify, user_message};
use crate::config::{ChatConfig, DEFAULT_TITLE};
use crate::error::{DomainError, ErrorKind};
use crate::ic5::{self, Ic5Record};
use crate::state::AppState;
use crate::stream::{StreamConsumer, StreamOutcome};
use crate::types::{Message, MessageRole, Session, SessionId, UploadFile};

/// Callback invoked when an `auth` error is surfaced, e.g. to navigate to a login page.
pub type AuthRedirect = Arc<dyn Fn(&DomainError) + Send + Sync>;

/// Observable state of the chat core.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub session_id: Option<SessionId>,
    pub busy: bool,
    pub history: Vec<Message>,
    /// Partial text of the in-flight reply
    pub buffer: String,
    pub ic5: Option<Ic5Record>,
    pub error: Option<DomainError>,
    pub attachments: Vec<Attachment>,
}

/// What one processed inbound event did.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A reply token arrived and was appended to the buffer
    Token(String),
    /// The reply finished and was appended to history
    TurnCompleted(Message),
    /// The reply stream failed; partial text was dropped
    TurnFailed(DomainError),
    /// An upload reached a terminal status
    AttachmentSettled(Attachment),
}

enum Inbound {
    Stream(Option<StreamOutcome>),
    Upload(Option<UploadSettled>),
}

/// Coordinator of one chat session at a time.
pub struct SessionOrchestrator {
    api: Arc<dyn ChatApi>,
    state: AppState,
    default_title: String,
    auth_redirect: Option<AuthRedirect>,
    session: Option<Session>,
    history: Vec<Message>,
    stream: StreamConsumer,
    attachments: AttachmentTracker,
    ic5: Option<Ic5Record>,
    error: Option<DomainError>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

impl SessionOrchestrator {
    /// Create an orchestrator with no current session.
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        let (snapshot_tx, _) = watch::channel(ChatSnapshot::default());
        Self {
            api,
            state: AppState::new(),
            default_title: DEFAULT_TITLE.to_string(),
            auth_redirect: None,
            session: None,
            history: Vec::new(),
            stream: StreamConsumer::new(),
            attachments: AttachmentTracker::default(),
            ic5: None,
            error: None,
            snapshot_tx,
        }
    }

    /// Apply session title and upload limit from configuration.
    pub fn with_config(mut self, config: &ChatConfig) -> Self {
        self.default_title = config.session.default_title.clone();
        self.attachments = AttachmentTracker::new(config.uploads.max_bytes);
        self
    }

    /// Share an application state store with the host.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = state;
        self
    }

    pub fn with_auth_redirect<F>(mut self, redirect: F) -> Self
    where
        F: Fn(&DomainError) + Send + Sync + 'static,
    {
        self.auth_redirect = Some(Arc::new(redirect));
        self
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Create a new session and make it current.
    ///
    /// On failure no session is current and a `server` error is surfaced.
    /// An `auth` cause still signs the user out and runs the redirect hook.
    pub async fn initialize(&mut self) -> bool {
        self.error = None;
        let _loading = self.state.loading_guard();

        let created = self.api.create_session(Some(&self.default_title)).await;
        match created {
            Ok(session) => {
                self.adopt(session);
                true
            }
            Err(e) => {
                self.clear_transient();
                self.session = None;
                let classified = classify(&e);
                if classified.is_auth() {
                    self.redirect_to_login(&classified);
                }
                let mut error = DomainError::new(ErrorKind::Server, "Could not start a new chat session.");
                error.details = classified.details;
                self.surface(error);
                false
            }
        }
    }

    /// Replace the current session with a fresh one.
    ///
    /// On failure the prior session stays current. No-op without a session.
    pub async fn reset(&mut self) -> bool {
        let Some(session_id) = self.session_id().map(str::to_string) else {
            debug!("Reset requested without a current session");
            return false;
        };
        self.error = None;
        let _loading = self.state.loading_guard();

        let replaced = self.api.reset_session(&session_id).await;
        match replaced {
            Ok(session) => {
                info!(old = %session_id, new = %session.id, "Session reset");
                self.adopt(session);
                true
            }
            Err(e) => {
                self.surface(classify(&e));
                false
            }
        }
    }

    /// Make `session` current and clear all transient state.
    fn adopt(&mut self, session: Session) {
        self.clear_transient();
        info!(session_id = %session.id, "Session started");
        self.session = Some(session);
        self.publish();
    }

    fn clear_transient(&mut self) {
        self.stream.close();
        self.attachments.clear();
        self.history.clear();
        self.ic5 = None;
        self.error = None;
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// An assistant turn is streaming or an attachment is mid-upload.
    pub fn is_busy(&self) -> bool {
        self.stream.is_open() || self.attachments.is_uploading()
    }

    /// Send a user message and open the reply stream.
    ///
    /// Ignored (returns `false`) without a current session, while busy, or
    /// for blank text. If the message cannot be stored the error is surfaced
    /// and no stream is opened.
    pub async fn submit_turn(&mut self, text: &str, research_mode: bool) -> bool {
        let Some(session_id) = self.session_id().map(str::to_string) else {
            debug!("Turn ignored: no current session");
            return false;
        };
        if self.is_busy() {
            debug!("Turn ignored: busy");
            return false;
        }
        if text.trim().is_empty() {
            return false;
        }

        self.error = None;
        self.publish();
        let _loading = self.state.loading_guard();

        let sent = self
            .api
            .send_message(&session_id, text, MessageRole::User)
            .await;
        match sent {
            Ok(message) => {
                self.history.push(message);
                self.stream.open(self.api.clone(), &session_id, research_mode);
                self.publish();
                true
            }
            Err(e) => {
                self.surface(classify(&e));
                false
            }
        }
    }

    /// Close the reply stream, dropping any partial text. Safe to call at any time.
    pub fn close_stream(&mut self) {
        if self.stream.is_open() {
            info!("Reply stream closed by caller");
        }
        self.stream.close();
        self.publish();
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Attach files to the current session and start uploading them.
    pub fn attach(&mut self, files: Vec<UploadFile>) -> Vec<AttachmentId> {
        let Some(session_id) = self.session_id().map(str::to_string) else {
            self.surface(DomainError::validation("Start a chat session before attaching files."));
            return Vec::new();
        };
        self.error = None;

        let ids = files
            .into_iter()
            .map(|file| self.attachments.start(file, self.api.clone(), &session_id))
            .collect();
        self.publish();
        ids
    }

    /// Remove an attachment at any status.
    pub fn remove_attachment(&mut self, id: &str) -> bool {
        let removed = self.attachments.remove(id);
        if removed {
            self.publish();
        }
        removed
    }

    // =========================================================================
    // Inbound events
    // =========================================================================

    /// Wait for the next stream or upload event and apply it.
    ///
    /// Returns `None` once no stream is open and no upload is in flight. A
    /// stream that never sends its end marker keeps this pending until
    /// [`close_stream`](Self::close_stream) or a transport error.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        loop {
            let stream_open = self.stream.is_open();
            let uploading = self.attachments.in_flight() > 0;
            if !stream_open && !uploading {
                return None;
            }

            let inbound = tokio::select! {
                outcome = self.stream.next_outcome(), if stream_open => Inbound::Stream(outcome),
                settled = self.attachments.next_settled(), if uploading => Inbound::Upload(settled),
            };

            match inbound {
                Inbound::Stream(Some(outcome)) => return Some(self.apply_stream(outcome)),
                Inbound::Stream(None) => self.stream.close(),
                Inbound::Upload(Some(UploadSettled::Applied(attachment))) => {
                    self.publish();
                    return Some(ChatEvent::AttachmentSettled(attachment));
                }
                Inbound::Upload(Some(UploadSettled::Discarded(_))) | Inbound::Upload(None) => {}
            }
        }
    }

    /// Process events until nothing is pending.
    pub async fn settle(&mut self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn apply_stream(&mut self, outcome: StreamOutcome) -> ChatEvent {
        match outcome {
            StreamOutcome::Token(token) => {
                self.publish();
                ChatEvent::Token(token)
            }
            StreamOutcome::Completed { session_id, text } => {
                let record = ic5::extract(&text);
                if !record.is_complete() {
                    debug!(warnings = ?record.parse_warnings, "Reply is not a complete IC-5 record");
                }
                let message = Message::assistant_placeholder(session_id, text);
                info!(chars = message.content.len(), "Assistant turn completed");
                self.history.push(message.clone());
                self.ic5 = Some(record);
                self.publish();
                ChatEvent::TurnCompleted(message)
            }
            StreamOutcome::Failed(error) => {
                self.surface(error.clone());
                ChatEvent::TurnFailed(error)
            }
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    /// Record an error as the current one. `auth` also drops the signed-in
    /// user and triggers the login redirect.
    fn surface(&mut self, error: DomainError) {
        warn!(kind = %error.kind, message = %error.message, "Chat error");
        if error.is_auth() {
            self.redirect_to_login(&error);
        }
        self.error = Some(error);
        self.publish();
    }

    fn redirect_to_login(&self, error: &DomainError) {
        self.state.set_current_user(None);
        if let Some(redirect) = &self.auth_redirect {
            redirect(error);
        }
    }

    pub fn dismiss_error(&mut self) {
        if self.error.take().is_some() {
            self.publish();
        }
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn buffer(&self) -> &str {
        self.stream.buffer()
    }

    pub fn ic5(&self) -> Option<&Ic5Record> {
        self.ic5.as_ref()
    }

    pub fn error(&self) -> Option<&DomainError> {
        self.error.as_ref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.attachments()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// User-facing text for the current error.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| {
            if e.message.is_empty() {
                user_message(e.kind)
            } else {
                e.message.as_str()
            }
        })
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            session_id: self.session_id().map(str::to_string),
            busy: self.is_busy(),
            history: self.history.clone(),
            buffer: self.stream.buffer().to_string(),
            ic5: self.ic5.clone(),
            error: self.error.clone(),
            attachments: self.attachments.attachments().to_vec(),
        }
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
