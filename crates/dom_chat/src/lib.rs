//! # dom_chat
//!
//! Chat streaming session core for the DOM assistant.
//!
//! This crate creates and replaces chat sessions, sends user turns, consumes
//! the server-sent token stream carrying the assistant's reply, extracts an
//! IC-5 decision record from each finished reply, and tracks concurrent file
//! uploads scoped to the session.
//!
//! # Features
//!
//! - **Single owner**: the [`SessionOrchestrator`] performs every state mutation
//! - **One turn at a time**: submission is ignored while a reply streams or a file uploads
//! - **Parallel uploads**: each attachment settles independently, in any order
//! - **Classified errors**: every backend failure becomes a [`DomainError`] exactly once
//! - **Mock backend**: [`MockChatApi`] for testing without a server
//!
//! ## Architecture
//!
//! ```text
//!                    ┌────────────────────────┐
//!                    │  SessionOrchestrator   │──▶ ChatSnapshot (watch)
//!                    └───┬────────────────┬───┘
//!                        │                │
//!              ┌─────────▼──────┐  ┌──────▼────────────┐
//!              │ StreamConsumer │  │ AttachmentTracker │
//!              └─────────┬──────┘  └──────┬────────────┘
//!                        │                │
//!                        ▼                ▼
//!                  ┌──────────────────────────┐
//!                  │  ChatApi (HTTP / mock)   │
//!                  └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dom_chat::{ChatConfig, ChatEvent, HttpChatClient, SessionOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChatConfig::from_env()?;
//!     let api = Arc::new(HttpChatClient::from_config(&config)?);
//!     let mut chat = SessionOrchestrator::new(api).with_config(&config);
//!
//!     chat.initialize().await;
//!     chat.submit_turn("What should we do about the Q3 budget?", false).await;
//!
//!     while let Some(event) = chat.next_event().await {
//!         if let ChatEvent::Token(token) = event {
//!             print!("{}", token);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod attachments;
pub mod classify;
pub mod config;
pub mod error;
pub mod http;
pub mod ic5;
pub mod mock;
pub mod orchestrator;
pub mod sse;
pub mod state;
pub mod stream;
pub mod types;

pub use api::{ApiResult, ChatApi, PushSource};
pub use attachments::{
    format_file_size, Attachment, AttachmentId, AttachmentStatus, AttachmentTracker,
    UploadOutcome, UploadSettled, MAX_UPLOAD_BYTES,
};
pub use classify::{classify, kind_for_status, user_message};
pub use config::{ApiConfig, ChatConfig, SessionConfig, UploadConfig};
pub use error::{ChatError, ChatResult, DomainError, ErrorKind, TransportError};
pub use http::HttpChatClient;
pub use ic5::{Ic5Record, Ic5Section};
pub use mock::{CapturedCall, MockChatApi, StreamScript};
pub use orchestrator::{AuthRedirect, ChatEvent, ChatSnapshot, SessionOrchestrator};
pub use sse::SseDecoder;
pub use state::{AppState, FontSize, Language, LoadingGuard, Theme, UiSettings, UiSettingsPatch, User};
pub use stream::{StreamConsumer, StreamOutcome, STREAM_END_SENTINEL, STREAM_ERROR_PREFIX};
pub use types::{
    Message, MessageRole, Session, SessionId, Source, SourceType, UploadFile, UploadedDocument,
};
