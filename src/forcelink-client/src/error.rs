//! Errors from the Salesforce REST client.

/// Failures from query and search calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Query rejected before anything was sent.
    #[error("{0}")]
    InvalidQuery(String),
    /// The org reported INVALID_SESSION_ID. Retryable after a fresh login.
    #[error("Session expired. Please login again.")]
    SessionExpired,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("request failed with status {status}: {body}")]
    Api { status: u16, body: String },
}

impl ClientError {
    /// True when a fresh login would make the same call succeed.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ClientError::SessionExpired)
    }
}
