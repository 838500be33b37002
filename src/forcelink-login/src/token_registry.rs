//! Anti-CSRF state token registry.
//!
//! SECURITY: The state parameter proves the OAuth callback corresponds to a
//! request this process initiated. Tokens are single-use and expire after
//! [`STATE_TOKEN_TTL`]; validation fails closed on unknown, replayed, or
//! expired values.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::{debug, warn};

use crate::constants::STATE_TOKEN_TTL;

struct IssuedToken {
    issued_at: Instant,
    used: bool,
}

/// Issues, validates, and expires anti-CSRF state tokens.
pub struct StateTokenRegistry {
    ttl: Duration,
    tokens: Mutex<HashMap<String, IssuedToken>>,
}

impl StateTokenRegistry {
    /// Registry with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(STATE_TOKEN_TTL)
    }

    /// Registry with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Generate and record a new token.
    ///
    /// 32 random bytes, base64url-encoded without padding. Issuing also
    /// sweeps expired and consumed entries; cleanup is amortized here rather
    /// than on a background timer.
    pub fn issue(&self) -> String {
        use rand::Rng;

        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
        let value = URL_SAFE_NO_PAD.encode(&bytes);

        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        tokens.retain(|_, t| !t.used && now.duration_since(t.issued_at) < self.ttl);
        tokens.insert(
            value.clone(),
            IssuedToken {
                issued_at: now,
                used: false,
            },
        );
        debug!(outstanding = tokens.len(), "Issued state token");
        value
    }

    /// Consume a token.
    ///
    /// Returns true exactly once per issued, unexpired value; unknown,
    /// replayed, and expired values all return false.
    pub fn validate(&self, value: &str) -> bool {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        match tokens.get_mut(value) {
            Some(token) if token.used => {
                warn!("State token replayed");
                false
            }
            Some(token) if token.issued_at.elapsed() >= self.ttl => {
                warn!("State token expired");
                tokens.remove(value);
                false
            }
            Some(token) => {
                token.used = true;
                true
            }
            None => {
                warn!("Unknown state token");
                false
            }
        }
    }

    /// Drop every outstanding token.
    pub fn reset(&self) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Re-stamp a token's issue time, as if it had been issued `age` ago.
    #[cfg(test)]
    pub(crate) fn backdate(&self, value: &str, age: Duration) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = tokens.get_mut(value)
            && let Some(past) = Instant::now().checked_sub(age)
        {
            token.issued_at = past;
        }
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for StateTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_succeeds_exactly_once() {
        let registry = StateTokenRegistry::new();
        let token = registry.issue();
        assert!(registry.validate(&token));
        assert!(!registry.validate(&token));
        assert!(!registry.validate(&token));
    }

    #[test]
    fn unknown_value_is_rejected() {
        let registry = StateTokenRegistry::new();
        assert!(!registry.validate("unknown-value"));
        registry.issue();
        assert!(!registry.validate("unknown-value"));
    }

    #[test]
    fn expired_token_is_rejected_even_when_unused() {
        let registry = StateTokenRegistry::new();
        let token = registry.issue();
        registry.backdate(&token, STATE_TOKEN_TTL + Duration::from_secs(1));
        assert!(!registry.validate(&token));
        // And it stays invalid.
        assert!(!registry.validate(&token));
    }

    #[test]
    fn issue_sweeps_expired_and_used_entries() {
        let registry = StateTokenRegistry::new();
        let consumed = registry.issue();
        assert!(registry.validate(&consumed));
        let stale = registry.issue();
        registry.backdate(&stale, STATE_TOKEN_TTL + Duration::from_secs(1));

        registry.issue();
        assert_eq!(registry.outstanding(), 1);
    }

    #[test]
    fn tokens_are_url_safe_with_enough_entropy() {
        let registry = StateTokenRegistry::new();
        for _ in 0..20 {
            let token = registry.issue();
            // 32 bytes base64url without padding.
            assert_eq!(token.len(), 43);
            assert!(
                token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
        }
    }

    #[test]
    fn reset_discards_outstanding_tokens() {
        let registry = StateTokenRegistry::new();
        let token = registry.issue();
        registry.reset();
        assert!(!registry.validate(&token));
    }
}
