//! Error types for the chat core.
//!
//! Two layers live here: [`TransportError`] is what the HTTP collaborator
//! reports, [`DomainError`] is the classified, user-facing form produced by
//! [`crate::classify`]. [`ChatError`] covers the crate's own setup surfaces
//! (configuration, client construction).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for setup operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Closed taxonomy of failures surfaced to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Offline, DNS, refused connection (status 0)
    Network,
    /// Session expired; the host is expected to redirect to login
    Auth,
    /// Authenticated but not allowed
    Permission,
    NotFound,
    /// Any other 4xx
    Client,
    /// 5xx
    Server,
    /// Rejected client-side before any network call
    Validation,
    /// Protocol or transport failure while a reply was streaming
    Stream,
    Unknown,
}

impl ErrorKind {
    /// Every kind, in taxonomy order.
    pub const ALL: [ErrorKind; 9] = [
        Self::Network,
        Self::Auth,
        Self::Permission,
        Self::NotFound,
        Self::Client,
        Self::Server,
        Self::Validation,
        Self::Stream,
        Self::Unknown,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::NotFound => "not-found",
            Self::Client => "client",
            Self::Server => "server",
            Self::Validation => "validation",
            Self::Stream => "stream",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure.
///
/// Always transient: it is attached to the operation that produced it and
/// replaced or cleared by the next attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct DomainError {
    pub kind: ErrorKind,
    /// Message suitable for showing to the user
    pub message: String,
    /// Opaque diagnostic payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DomainError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Client-side validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Failure of an open reply stream.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Stream, message)
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}

/// Failure reported by the HTTP collaborator.
///
/// `status` is `0` when no HTTP response was received at all.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("HTTP {status}: {message}")]
pub struct TransportError {
    pub status: u16,
    /// Developer-facing message (for logs)
    pub message: String,
    /// Backend-defined error code, if any
    pub code: Option<String>,
    /// Validation details or other structured payload
    pub details: Option<serde_json::Value>,
    /// Request URL that failed
    pub url: Option<String>,
}

impl TransportError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
            details: None,
            url: None,
        }
    }

    /// Connection-level failure with no HTTP status.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        let url = err.url().map(|u| u.to_string());
        let mut transport = Self::new(status, err.to_string());
        transport.url = url;
        transport
    }
}

/// Errors from the crate's setup surfaces.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_wire_names() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not-found\"");

        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::validation("File too large");
        assert_eq!(err.to_string(), "validation: File too large");
        assert!(!err.is_auth());
        assert!(err.details.is_none());
    }

    #[test]
    fn test_transport_error_builders() {
        let err = TransportError::network("connection refused")
            .with_code("ECONNREFUSED")
            .with_url("http://localhost/api/chat/send");

        assert_eq!(err.status, 0);
        assert_eq!(err.code.as_deref(), Some("ECONNREFUSED"));
        assert_eq!(err.url.as_deref(), Some("http://localhost/api/chat/send"));
        assert_eq!(err.to_string(), "HTTP 0: connection refused");
    }
}
