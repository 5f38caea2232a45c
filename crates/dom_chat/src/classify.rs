//! Error classifier.
//!
//! The single place HTTP status semantics are encoded. Every collaborator
//! failure passes through [`classify`] exactly once before it is surfaced.

use serde_json::json;

use crate::error::{DomainError, ErrorKind, TransportError};

/// Map a transport failure onto the closed [`ErrorKind`] taxonomy.
///
/// Total: every input produces a `DomainError`.
pub fn classify(error: &TransportError) -> DomainError {
    let kind = kind_for_status(error.status);

    DomainError::new(kind, user_message(kind)).with_details(json!({
        "status": error.status,
        "message": error.message,
        "code": error.code,
        "url": error.url,
        "details": error.details,
    }))
}

/// Status code boundary table.
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        0 => ErrorKind::Network,
        401 => ErrorKind::Auth,
        403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        400..=499 => ErrorKind::Client,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

/// Default user-facing message for a kind.
pub fn user_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => {
            "Could not reach the server. Check your connection or try again in a moment."
        }
        ErrorKind::Auth => "Your session has expired. Please sign in again.",
        ErrorKind::Permission => "You do not have permission to perform this action.",
        ErrorKind::NotFound => "The requested data could not be found.",
        ErrorKind::Client => "The request could not be processed. Check your input.",
        ErrorKind::Server => {
            "The server reported an error. Try again later or contact your administrator."
        }
        ErrorKind::Validation => "The input did not pass validation.",
        ErrorKind::Stream => "The reply stream was interrupted.",
        ErrorKind::Unknown => "An unexpected error occurred.",
    }
}
