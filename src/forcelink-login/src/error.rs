//! Errors that can occur during the login flow.

/// Login flow failures, reported to the tool layer as structured results.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Configuration required. Please configure the Consumer Key.")]
    ConfigurationRequired,
    #[error("{0}")]
    EnvironmentSelectionRequired(&'static str),
    #[error("Timeout waiting for authentication")]
    CallbackTimeout,
    #[error("Authentication failed - no access token received")]
    MissingToken,
    // Expired, replayed, and unknown states all collapse here so the
    // message does not reveal which check failed.
    #[error("Invalid state parameter - possible CSRF attempt")]
    InvalidState,
    #[error("no free port in {start}..={end}")]
    PortExhausted { start: u16, end: u16 },
    #[error("credential storage error: {0}")]
    Storage(String),
    #[error("failed to open browser: {0}")]
    Browser(String),
    #[error("session error: {0}")]
    RemoteSession(String),
    #[error("listener error: {0}")]
    Listener(String),
}

impl AuthError {
    /// Selector closed or timed out without a choice.
    pub fn selection_required() -> Self {
        Self::EnvironmentSelectionRequired("Environment selection required")
    }

    /// User picked "cancel" on the selector page.
    pub fn selection_cancelled() -> Self {
        Self::EnvironmentSelectionRequired("Login cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_reported_strings() {
        assert_eq!(
            AuthError::CallbackTimeout.to_string(),
            "Timeout waiting for authentication"
        );
        assert_eq!(
            AuthError::selection_cancelled().to_string(),
            "Login cancelled"
        );
        assert!(
            AuthError::InvalidState
                .to_string()
                .contains("possible CSRF attempt")
        );
    }
}
