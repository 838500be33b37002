//! State tracking for the authentication flow.

use std::str::FromStr;

use crate::constants::{PRODUCTION_LOGIN_HOST, SANDBOX_LOGIN_HOST};

/// Target Salesforce environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Sandbox org (test.salesforce.com).
    Sandbox,
    /// Production org (login.salesforce.com).
    Production,
}

impl Environment {
    /// Authorize host for this environment.
    pub fn login_host(&self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_LOGIN_HOST,
            Environment::Production => PRODUCTION_LOGIN_HOST,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Sandbox => write!(f, "sandbox"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            _ => Err(()),
        }
    }
}

/// Phase of the current login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Attempt created, nothing done yet.
    Initial,
    /// Waiting for the user to submit a Consumer Key.
    WaitingForConfig,
    /// Browser redirect in flight.
    OAuthFlow,
    /// Terminal: authenticated.
    Completed,
    /// Terminal: failed.
    Error,
}

/// State and data for one login attempt.
///
/// A fresh context is created for every attempt; terminal states are never
/// left. `error_message` is set exactly when the state is [`AuthState::Error`]
/// and `instance_url` exactly when it is [`AuthState::Completed`], which the
/// transition methods enforce.
#[derive(Debug, Clone)]
pub struct AuthContext {
    state: AuthState,
    environment: Option<Environment>,
    instance_url: Option<String>,
    error_message: Option<String>,
}

impl AuthContext {
    /// A fresh context in the initial state.
    pub fn new() -> Self {
        Self {
            state: AuthState::Initial,
            environment: None,
            instance_url: None,
            error_message: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn environment(&self) -> Option<Environment> {
        self.environment
    }

    pub fn instance_url(&self) -> Option<&str> {
        self.instance_url.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = Some(environment);
    }

    /// Move to a non-terminal state.
    pub fn transition(&mut self, state: AuthState) {
        debug_assert!(!matches!(state, AuthState::Completed | AuthState::Error));
        self.state = state;
    }

    /// Terminal success: records the authenticated instance URL.
    pub fn complete(&mut self, instance_url: String) {
        self.state = AuthState::Completed;
        self.instance_url = Some(instance_url);
        self.error_message = None;
    }

    /// Terminal failure: records the error message.
    pub fn fail(&mut self, message: String) {
        self.state = AuthState::Error;
        self.error_message = Some(message);
        self.instance_url = None;
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}
