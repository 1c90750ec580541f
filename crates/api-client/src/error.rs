//! Caller-facing error contract
//!
//! Every failure a caller can observe is an `ApiError`: a kind, a single
//! human-readable message, and the HTTP status when one was received. The
//! raw response body never escapes the client.

use std::fmt;

/// What went wrong, derived from the transport outcome.
///
/// Only `ExpiredCredential` is ever recovered locally, and only once per
/// request. Everything else goes straight back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 401 from a non-exempt path. Triggers refresh on the first attempt;
    /// surfaced if the replayed request is rejected again.
    ExpiredCredential,
    /// The refresh exchange failed. The session has been cleared.
    SessionInvalid,
    /// No response: timeout, connection refused, body read failure.
    Network,
    /// Any other 4xx.
    Validation,
    /// 5xx, or a status the client does not recognise.
    Server,
    /// 401 from an exempt auth endpoint (bad login, invalid token on verify).
    Unauthorized,
    /// 2xx body that could not be decoded into the requested type.
    InvalidResponse,
}

impl ErrorKind {
    /// Classify a failed response by status. `exempt` is whether the
    /// request targeted an exempt endpoint.
    pub fn from_status(status: u16, exempt: bool) -> Self {
        match status {
            401 if exempt => ErrorKind::Unauthorized,
            401 => ErrorKind::ExpiredCredential,
            400..=499 => ErrorKind::Validation,
            _ => ErrorKind::Server,
        }
    }

    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::ExpiredCredential => "expired_credential",
            ErrorKind::SessionInvalid => "session_invalid",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Server => "server",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized failure returned to callers.
///
/// `Clone` so a single refresh failure can be delivered to every queued
/// caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn session_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionInvalid, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    /// Whether the caller has to sign in again before retrying.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::SessionInvalid | ErrorKind::ExpiredCredential
        )
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;
