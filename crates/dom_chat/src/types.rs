//! Core types shared with the chat backend.
//!
//! Field names follow the backend's JSON (snake_case).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a chat session
pub type SessionId = String;

/// A conversational session owned by one user within one tenant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Assistant,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }
}

/// Where the assistant drew a piece of information from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceType {
    #[serde(rename = "RAG")]
    Rag,
    Memory,
    Assumption,
    Web,
    Other,
}

/// A reference attached to an assistant message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub title: String,
    /// Document id or similar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    /// Unprocessed model payload, when the backend keeps one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_llm_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create an assistant message from a finished stream.
    ///
    /// The stream protocol does not return the stored message id, so the id
    /// is a client-side placeholder prefixed with `local-`.
    pub fn assistant_placeholder(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            session_id: session_id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
            raw_llm_response: None,
            sources: Vec::new(),
            created_at: now,
            updated_at: Some(now),
        }
    }

    /// Whether the id was synthesized locally rather than assigned by the server.
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with("local-")
    }
}

/// A file chosen by the user for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Knowledge document created by a successful upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedDocument {
    pub id: String,
    pub tenant_id: String,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub file_type: Option<String>,
    /// Human-readable size reported by the backend, e.g. "10MB"
    #[serde(default)]
    pub file_size: Option<String>,
    #[serde(default)]
    pub uploaded_by_user_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
