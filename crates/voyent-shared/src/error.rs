//! SDK error types.

use thiserror::Error as ThisError;

/// Canonical error type for SDK operations.
///
/// Validation errors are surfaced before any network activity and are never
/// retried. HTTP errors preserve the status and body unchanged so callers can
/// inspect the service response.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A required parameter was missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// The operation requires a live session.
    #[error("not connected")]
    NotConnected,

    /// The access token could not be refreshed, including the single retry.
    #[error("access token refresh failed: {0}")]
    RefreshFailed(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
