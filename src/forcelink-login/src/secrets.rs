//! Credential storage behind the system keyring.
//!
//! - Windows: Credential Manager
//! - macOS: Keychain
//! - Linux: Secret Service (gnome-keyring, kwallet)

use anyhow::{Context, Result};
use tracing::debug;

/// Key/value secret storage.
///
/// The orchestrator only ever reads and writes small string secrets (the
/// connected app's Consumer Key), so the surface stays minimal. Tests swap
/// in [`MemorySecretStore`].
pub trait SecretStore: Send + Sync {
    /// Fetch a secret, `None` when it has never been stored.
    fn get(&self, service: &str, key: &str) -> Result<Option<String>>;

    /// Store or overwrite a secret.
    fn set(&self, service: &str, key: &str, value: &str) -> Result<()>;
}

/// System keyring backend.
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, key).context("Failed to access keyring")
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        match Self::entry(service, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {key} from keyring")),
        }
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<()> {
        Self::entry(service, key)?
            .set_password(value)
            .with_context(|| format!("Failed to save {key} to keyring"))?;
        debug!(key, "Saved secret to keyring");
        Ok(())
    }
}

/// In-memory backend for tests.
pub struct MemorySecretStore {
    values: std::sync::Mutex<std::collections::HashMap<(String, String), String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self {
            values: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(&(service.to_string(), key.to_string())).cloned())
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert((service.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_and_overwrites() {
        let store = MemorySecretStore::new();
        assert!(store.get("svc", "k").expect("get").is_none());

        store.set("svc", "k", "first").expect("set");
        assert_eq!(store.get("svc", "k").expect("get").as_deref(), Some("first"));

        store.set("svc", "k", "second").expect("set");
        assert_eq!(
            store.get("svc", "k").expect("get").as_deref(),
            Some("second")
        );

        // Different service, same key.
        assert!(store.get("other", "k").expect("get").is_none());
    }
}
