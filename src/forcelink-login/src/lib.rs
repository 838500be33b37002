//! Forcelink Login - Browser-based Salesforce authentication.
//!
//! Implements the OAuth 2.0 user-agent (implicit) flow for desktop use:
//! - Ephemeral localhost listeners for configuration, environment
//!   selection, and the OAuth callback
//! - Single-use, expiring anti-CSRF state tokens
//! - Consumer Key storage in the OS keychain (Windows Credential Manager,
//!   macOS Keychain, Linux Secret Service)

pub mod constants;

mod browser;
mod error;
mod flow;
mod listener;
mod pages;
mod secrets;
mod state;
mod token_registry;

pub use browser::{SystemBrowser, UrlOpener};
pub use error::AuthError;
pub use flow::{AuthOrchestrator, LoginSuccess, RestSessionFactory, SessionFactory};
pub use listener::{ListenerLease, ListenerRole};
pub use secrets::{KeyringSecretStore, MemorySecretStore, SecretStore};
pub use state::{AuthContext, AuthState, Environment};
pub use token_registry::StateTokenRegistry;
