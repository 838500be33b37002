//! The interactive login flow.
//!
//! Drives the OAuth 2.0 user-agent (implicit) flow end to end: resolve the
//! Consumer Key, resolve the target environment, send the user's browser to
//! the authorize endpoint, and capture the redirected token on a local
//! listener. Every wait is bounded and every listener is released on every
//! exit path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use forcelink_client::SalesforceClient;
use tracing::{info, warn};

use crate::browser::UrlOpener;
use crate::constants::{
    AUTHORIZE_PATH, CALLBACK_URL, CALLBACK_WAIT, CONFIG_WAIT, KEYRING_KEY_CONSUMER,
    KEYRING_SERVICE, OAUTH_PROMPT, OAUTH_SCOPE, SELECTOR_WAIT,
};
use crate::error::AuthError;
use crate::listener::{ListenerLease, ListenerRole};
use crate::secrets::SecretStore;
use crate::state::{AuthContext, AuthState, Environment};
use crate::token_registry::StateTokenRegistry;

/// Builds an API client once a token has been captured.
///
/// Seam for tests and for swapping the REST client construction.
pub trait SessionFactory: Send + Sync {
    fn build(&self, instance_url: &str, access_token: &str)
    -> Result<SalesforceClient, AuthError>;
}

/// Production factory: a REST client against the authenticated org.
pub struct RestSessionFactory;

impl SessionFactory for RestSessionFactory {
    fn build(
        &self,
        instance_url: &str,
        access_token: &str,
    ) -> Result<SalesforceClient, AuthError> {
        SalesforceClient::new(instance_url, access_token)
            .map_err(|e| AuthError::RemoteSession(e.to_string()))
    }
}

/// Outcome of a completed login.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoginSuccess {
    pub instance_url: String,
}

/// Owns the login state machine and the authenticated session.
pub struct AuthOrchestrator {
    secrets: Arc<dyn SecretStore>,
    opener: Arc<dyn UrlOpener>,
    factory: Arc<dyn SessionFactory>,
    registry: StateTokenRegistry,
    context: AuthContext,
    client: Option<SalesforceClient>,
    instance_url: Option<String>,
}

impl AuthOrchestrator {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        opener: Arc<dyn UrlOpener>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            secrets,
            opener,
            factory,
            registry: StateTokenRegistry::new(),
            context: AuthContext::new(),
            client: None,
            instance_url: None,
        }
    }

    /// State of the current (or last) login attempt.
    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    /// The authenticated API client, once login completed.
    pub fn client(&self) -> Option<&SalesforceClient> {
        self.client.as_ref()
    }

    pub fn instance_url(&self) -> Option<&str> {
        self.instance_url.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_some()
    }

    /// Run the interactive login flow.
    ///
    /// `environment` skips the selector page when given; it must be
    /// `"sandbox"` or `"production"`. A fresh [`AuthContext`] is created for
    /// every attempt, and on failure it lands in [`AuthState::Error`] with
    /// the reported message.
    pub async fn start_login_flow(
        &mut self,
        environment: Option<&str>,
    ) -> Result<LoginSuccess, AuthError> {
        self.context = AuthContext::new();
        match self.run_login(environment).await {
            Ok(success) => Ok(success),
            Err(e) => {
                self.context.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_login(&mut self, environment: Option<&str>) -> Result<LoginSuccess, AuthError> {
        let environment = match environment {
            Some(name) => Some(
                name.parse::<Environment>()
                    .map_err(|_| AuthError::selection_required())?,
            ),
            None => None,
        };

        let consumer_key = match self
            .secrets
            .get(KEYRING_SERVICE, KEYRING_KEY_CONSUMER)
            .map_err(|e| AuthError::Storage(e.to_string()))?
        {
            Some(key) => key,
            None => self.collect_consumer_key().await?,
        };

        let environment = match environment {
            Some(env) => env,
            None => self.collect_environment().await?,
        };
        self.context.set_environment(environment);
        info!(%environment, "Environment selected");

        // The callback listener must be live before the browser is sent to
        // the authorize endpoint.
        self.context.transition(AuthState::OAuthFlow);
        let lease = ListenerLease::bind(ListenerRole::Callback).await?;
        let state = self.registry.issue();
        let authorize_url = authorize_url(environment.login_host(), &consumer_key, &state);
        self.opener
            .open(&authorize_url)
            .map_err(|e| AuthError::Browser(e.to_string()))?;

        let callback_url = Self::wait_on(lease, CALLBACK_WAIT)
            .await
            .ok_or(AuthError::CallbackTimeout)?;
        self.handle_oauth_callback(&callback_url)
    }

    /// Serve the configuration page and persist the submitted Consumer Key.
    async fn collect_consumer_key(&mut self) -> Result<String, AuthError> {
        self.context.transition(AuthState::WaitingForConfig);
        info!("No Consumer Key configured; opening configuration page");

        let lease = ListenerLease::bind(ListenerRole::Config).await?;
        self.opener
            .open(&lease.root_url())
            .map_err(|e| AuthError::Browser(e.to_string()))?;

        let key = Self::wait_on(lease, CONFIG_WAIT)
            .await
            .ok_or(AuthError::ConfigurationRequired)?;
        self.secrets
            .set(KEYRING_SERVICE, KEYRING_KEY_CONSUMER, &key)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        info!("Consumer Key saved");
        Ok(key)
    }

    /// Serve the environment selector and wait for the user's choice.
    async fn collect_environment(&mut self) -> Result<Environment, AuthError> {
        let lease = ListenerLease::bind(ListenerRole::Selector).await?;
        self.opener
            .open(&lease.root_url())
            .map_err(|e| AuthError::Browser(e.to_string()))?;

        let choice = Self::wait_on(lease, SELECTOR_WAIT)
            .await
            .ok_or_else(AuthError::selection_required)?;
        if choice == "cancel" {
            return Err(AuthError::selection_cancelled());
        }
        choice
            .parse::<Environment>()
            .map_err(|_| AuthError::selection_required())
    }

    async fn wait_on(mut lease: ListenerLease, timeout: Duration) -> Option<String> {
        let result = lease.await_result(timeout).await;
        lease.close();
        result
    }

    /// Consume a captured callback URL and establish the session.
    ///
    /// Accepts the full redirect URL with the token parameters in the
    /// fragment. The access token and instance URL must both be present, and
    /// the anti-CSRF state must validate, before a session is built.
    pub fn handle_oauth_callback(
        &mut self,
        callback_url: &str,
    ) -> Result<LoginSuccess, AuthError> {
        match self.process_callback(callback_url) {
            Ok(success) => Ok(success),
            Err(e) => {
                self.context.fail(e.to_string());
                Err(e)
            }
        }
    }

    fn process_callback(&mut self, callback_url: &str) -> Result<LoginSuccess, AuthError> {
        let params = parse_fragment(callback_url);

        let access_token = params.get("access_token").ok_or(AuthError::MissingToken)?;
        let instance_url = params.get("instance_url").ok_or(AuthError::MissingToken)?;

        let state = params.get("state").ok_or_else(|| {
            warn!("Callback carried no state parameter");
            AuthError::InvalidState
        })?;
        if !self.registry.validate(state) {
            return Err(AuthError::InvalidState);
        }

        let client = self.factory.build(instance_url, access_token)?;
        self.client = Some(client);
        self.instance_url = Some(instance_url.clone());
        self.context.complete(instance_url.clone());
        info!(%instance_url, "Authentication completed");

        Ok(LoginSuccess {
            instance_url: instance_url.clone(),
        })
    }

    /// Drop the session and all outstanding state tokens. Idempotent; the
    /// last attempt's context is left readable.
    pub fn clear_session(&mut self) {
        if self.client.take().is_some() {
            info!("Session cleared");
        }
        self.instance_url = None;
        self.registry.reset();
    }
}

/// Authorize endpoint URL for the user-agent flow.
fn authorize_url(login_host: &str, consumer_key: &str, state: &str) -> String {
    format!(
        "{login_host}{AUTHORIZE_PATH}?response_type=token&client_id={}&redirect_uri={}&scope={}&state={}&prompt={}&display=page",
        urlencoding::encode(consumer_key),
        urlencoding::encode(CALLBACK_URL),
        urlencoding::encode(OAUTH_SCOPE),
        urlencoding::encode(state),
        urlencoding::encode(OAUTH_PROMPT),
    )
}

/// Parameters from a callback URL's fragment.
///
/// Values are percent-decoded; a value that fails to decode is kept raw.
fn parse_fragment(callback_url: &str) -> HashMap<String, String> {
    let Some((_, fragment)) = callback_url.split_once('#') else {
        return HashMap::new();
    };
    fragment
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((key.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::RecordingOpener;
    use crate::secrets::MemorySecretStore;

    fn orchestrator() -> (AuthOrchestrator, Arc<RecordingOpener>, Arc<MemorySecretStore>) {
        let opener = Arc::new(RecordingOpener::new());
        let secrets = Arc::new(MemorySecretStore::new());
        let orchestrator = AuthOrchestrator::new(
            secrets.clone(),
            opener.clone(),
            Arc::new(RestSessionFactory),
        );
        (orchestrator, opener, secrets)
    }

    fn callback_url(state: &str) -> String {
        format!(
            "http://localhost:8787/#access_token=TOKEN123&instance_url=https%3A%2F%2Facme.my.salesforce.com&state={state}"
        )
    }

    #[test]
    fn parse_fragment_decodes_parameters() {
        let params = parse_fragment(
            "http://localhost:8787/#access_token=a%2Fb&instance_url=https%3A%2F%2Fx&state=s&flag",
        );
        assert_eq!(params.get("access_token").map(String::as_str), Some("a/b"));
        assert_eq!(
            params.get("instance_url").map(String::as_str),
            Some("https://x")
        );
        assert_eq!(params.get("state").map(String::as_str), Some("s"));
        assert!(!params.contains_key("flag"));

        assert!(parse_fragment("http://localhost:8787/?no=fragment").is_empty());
    }

    #[test]
    fn authorize_url_carries_the_flow_parameters() {
        let url = authorize_url("https://test.salesforce.com", "KEY/1", "STATE");
        assert!(url.starts_with("https://test.salesforce.com/services/oauth2/authorize?"));
        assert!(url.contains("response_type=token"));
        assert!(url.contains("client_id=KEY%2F1"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8787"));
        assert!(url.contains("scope=api%20full%20refresh_token"));
        assert!(url.contains("state=STATE"));
        assert!(url.contains("prompt=login%20consent%20select_account"));
        assert!(url.contains("display=page"));
    }

    #[test]
    fn callback_with_valid_state_completes_the_session() {
        let (mut orch, _, _) = orchestrator();
        let state = orch.registry.issue();

        let success = orch
            .handle_oauth_callback(&callback_url(&state))
            .expect("callback");
        assert_eq!(success.instance_url, "https://acme.my.salesforce.com");
        assert!(orch.is_authenticated());
        assert_eq!(orch.context().state(), AuthState::Completed);
        assert_eq!(
            orch.instance_url(),
            Some("https://acme.my.salesforce.com")
        );
    }

    #[test]
    fn replayed_state_is_rejected() {
        let (mut orch, _, _) = orchestrator();
        let state = orch.registry.issue();
        orch.handle_oauth_callback(&callback_url(&state))
            .expect("first use");

        let err = orch
            .handle_oauth_callback(&callback_url(&state))
            .expect_err("replay");
        assert!(matches!(err, AuthError::InvalidState));
        assert_eq!(orch.context().state(), AuthState::Error);
    }

    #[test]
    fn missing_token_is_reported_before_state() {
        let (mut orch, _, _) = orchestrator();
        let state = orch.registry.issue();

        let url = format!("http://localhost:8787/#instance_url=https%3A%2F%2Fx&state={state}");
        let err = orch.handle_oauth_callback(&url).expect_err("no token");
        assert!(matches!(err, AuthError::MissingToken));
        assert!(!orch.is_authenticated());
    }

    #[test]
    fn missing_state_is_an_invalid_state() {
        let (mut orch, _, _) = orchestrator();
        let url = "http://localhost:8787/#access_token=T&instance_url=https%3A%2F%2Fx";
        let err = orch.handle_oauth_callback(url).expect_err("no state");
        assert!(matches!(err, AuthError::InvalidState));
    }

    #[test]
    fn clear_session_is_idempotent_and_keeps_the_context() {
        let (mut orch, _, _) = orchestrator();
        let state = orch.registry.issue();
        orch.handle_oauth_callback(&callback_url(&state))
            .expect("callback");

        orch.clear_session();
        assert!(!orch.is_authenticated());
        assert!(orch.instance_url().is_none());
        assert_eq!(orch.context().state(), AuthState::Completed);

        orch.clear_session();
        assert!(!orch.is_authenticated());
    }

    #[tokio::test]
    async fn unknown_environment_name_fails_before_any_listener() {
        let (mut orch, opener, _) = orchestrator();
        let err = orch
            .start_login_flow(Some("staging"))
            .await
            .expect_err("unknown environment");
        assert!(matches!(err, AuthError::EnvironmentSelectionRequired(_)));
        assert_eq!(orch.context().state(), AuthState::Error);
        assert!(opener.opened().is_empty());
    }

    async fn wait_for_opened_url(opener: &RecordingOpener, index: usize) -> String {
        for _ in 0..400 {
            let opened = opener.opened();
            if opened.len() > index {
                return opened[index].clone();
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("timed out waiting for browser URL #{index}");
    }

    // Full interactive flow against the real listeners on the default
    // ports, with a scripted "user" driving the browser steps.
    #[tokio::test(flavor = "multi_thread")]
    async fn full_login_flow_end_to_end() {
        let (mut orch, opener, secrets) = orchestrator();

        let driver_opener = opener.clone();
        let driver = tokio::spawn(async move {
            // Step 1: the configuration page.
            let config_url = wait_for_opened_url(&driver_opener, 0).await;
            assert!(config_url.contains(":8788"));
            let response =
                reqwest::get(format!("{config_url}/submit?consumer_key=CK_0123456789"))
                    .await
                    .expect("submit consumer key");
            assert!(response.status().is_success());

            // Step 2: the environment selector.
            let selector_url = wait_for_opened_url(&driver_opener, 1).await;
            let response = reqwest::get(format!("{selector_url}/select?env=sandbox"))
                .await
                .expect("select environment");
            assert!(response.status().is_success());

            // Step 3: the provider redirect, relayed through the callback
            // listener exactly as the relay page would.
            let authorize = wait_for_opened_url(&driver_opener, 2).await;
            assert!(authorize.starts_with("https://test.salesforce.com/services/oauth2/authorize"));
            let state = authorize
                .split("state=")
                .nth(1)
                .and_then(|rest| rest.split('&').next())
                .expect("state parameter")
                .to_string();

            let fragment = format!(
                "access_token%3DTOK%26instance_url%3Dhttps%253A%252F%252Facme.my.salesforce.com%26state%3D{state}"
            );
            let response = reqwest::get(format!("http://localhost:8787/?hash={fragment}"))
                .await
                .expect("relay fragment");
            assert!(response.status().is_success());
        });

        let success = orch
            .start_login_flow(None)
            .await
            .expect("login flow should complete");
        driver.await.expect("driver");

        assert_eq!(success.instance_url, "https://acme.my.salesforce.com");
        assert_eq!(orch.context().state(), AuthState::Completed);
        assert_eq!(orch.context().environment(), Some(Environment::Sandbox));
        assert!(orch.is_authenticated());
        assert_eq!(
            secrets
                .get(KEYRING_SERVICE, KEYRING_KEY_CONSUMER)
                .expect("get")
                .as_deref(),
            Some("CK_0123456789")
        );
        assert_eq!(opener.opened().len(), 3);
    }
}
