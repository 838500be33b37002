//! Constants for the forcelink-login module.

use std::time::Duration;

/// Service name for keyring storage.
pub const KEYRING_SERVICE: &str = "forcelink";

/// Keyring key holding the connected app's Consumer Key.
pub const KEYRING_KEY_CONSUMER: &str = "consumer_key";

/// Fixed OAuth callback port. Must match the redirect URI registered with
/// the connected app.
pub const CALLBACK_PORT: u16 = 8787;

/// Redirect URI registered with the identity provider.
pub const CALLBACK_URL: &str = "http://localhost:8787";

/// Fixed port for the one-time configuration screen.
pub const CONFIG_PORT: u16 = 8788;

/// Base port for the environment selector scan.
pub const SELECTOR_PORT_BASE: u16 = 8787;

/// Ports tried per bounded scan before giving up.
pub const PORT_SCAN_ATTEMPTS: u16 = 10;

/// Maximum time to wait for the configuration screen submission.
pub const CONFIG_WAIT: Duration = Duration::from_secs(300);

/// Maximum time to wait for an environment selection.
pub const SELECTOR_WAIT: Duration = Duration::from_secs(60);

/// Maximum time to wait for the OAuth callback redirect.
pub const CALLBACK_WAIT: Duration = Duration::from_secs(300);

/// Time-to-live for an issued anti-CSRF state token.
pub const STATE_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Authorize host for sandbox orgs.
pub const SANDBOX_LOGIN_HOST: &str = "https://test.salesforce.com";

/// Authorize host for production orgs.
pub const PRODUCTION_LOGIN_HOST: &str = "https://login.salesforce.com";

/// Authorize endpoint path on either host.
pub const AUTHORIZE_PATH: &str = "/services/oauth2/authorize";

/// OAuth scopes requested during login.
pub const OAUTH_SCOPE: &str = "api full refresh_token";

/// Prompt behavior requested from the identity provider.
pub const OAUTH_PROMPT: &str = "login consent select_account";
