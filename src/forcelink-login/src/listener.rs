//! Ephemeral local HTTP listeners for the interactive login steps.
//!
//! Each lease binds a loopback port, serves the small route set its role
//! needs, and delivers a single result through a one-shot event. The accept
//! loop runs on its own task; the orchestrator waits on the event from the
//! caller task, so a handler can fire completion without deadlocking the
//! waiter. Leases close on every exit path: [`ListenerLease::close`] is
//! idempotent and `Drop` invokes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::get;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::{
    CALLBACK_PORT, CONFIG_PORT, PORT_SCAN_ATTEMPTS, SELECTOR_PORT_BASE,
};
use crate::error::AuthError;
use crate::pages;

/// What a listener is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRole {
    /// Consumer Key configuration form.
    Config,
    /// Environment selection page.
    Selector,
    /// OAuth callback capture.
    Callback,
}

impl std::fmt::Display for ListenerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerRole::Config => write!(f, "config"),
            ListenerRole::Selector => write!(f, "selector"),
            ListenerRole::Callback => write!(f, "callback"),
        }
    }
}

/// Single-fire slot the route handlers deliver their result into.
type ResultSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

async fn fire(slot: &ResultSlot, value: String) {
    if let Some(tx) = slot.lock().await.take() {
        let _ = tx.send(value);
    } else {
        debug!("Result already delivered; ignoring duplicate submission");
    }
}

/// A temporarily bound local server.
///
/// The role-specific result is a string payload: the submitted consumer key
/// (config), the chosen environment name (selector), or the reconstructed
/// callback URL (callback).
#[derive(Debug)]
pub struct ListenerLease {
    role: ListenerRole,
    port: u16,
    result_rx: Option<oneshot::Receiver<String>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerLease {
    /// Bind a lease on the role's default port(s).
    ///
    /// Callback and configuration ports are fixed — their URLs are
    /// registered with the identity provider or baked into the pages — so
    /// they get a single attempt; the selector scans a bounded range.
    pub async fn bind(role: ListenerRole) -> Result<Self, AuthError> {
        match role {
            ListenerRole::Config => Self::bind_fixed(role, CONFIG_PORT).await,
            ListenerRole::Selector => {
                Self::bind_at(role, SELECTOR_PORT_BASE, PORT_SCAN_ATTEMPTS).await
            }
            ListenerRole::Callback => Self::bind_fixed(role, CALLBACK_PORT).await,
        }
    }

    // Fixed-port roles retry briefly: the previous lease's socket may still
    // be closing when the next step binds the same port.
    async fn bind_fixed(role: ListenerRole, port: u16) -> Result<Self, AuthError> {
        for _ in 0..20 {
            match Self::bind_at(role, port, 1).await {
                Ok(lease) => return Ok(lease),
                Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
        Self::bind_at(role, port, 1).await
    }

    /// Bind a lease, scanning up to `attempts` consecutive ports from
    /// `start_port`.
    pub async fn bind_at(
        role: ListenerRole,
        start_port: u16,
        attempts: u16,
    ) -> Result<Self, AuthError> {
        let (listener, port) = bind_first_free(start_port, attempts).await?;

        let (result_tx, result_rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(result_tx)));

        let app = match role {
            ListenerRole::Config => config_router(slot),
            ListenerRole::Selector => selector_router(slot),
            ListenerRole::Callback => callback_router(slot, port),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "Listener failed");
            }
        });

        info!(%role, port, "Listener started");
        Ok(Self {
            role,
            port,
            result_rx: Some(result_rx),
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Root URL to open in the user's browser.
    pub fn root_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Wait for the role's result.
    ///
    /// Returns `None` when the timeout elapses or the listener died before
    /// delivering. Consumes the result event: a second call returns `None`.
    pub async fn await_result(&mut self, timeout: Duration) -> Option<String> {
        let rx = self.result_rx.take()?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => {
                warn!(role = %self.role, "Listener closed before delivering a result");
                None
            }
            Err(_) => {
                warn!(role = %self.role, timeout_secs = timeout.as_secs(), "Timed out waiting for result");
                None
            }
        }
    }

    /// Stop accepting connections and release the port. Idempotent.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(role = %self.role, port = self.port, "Listener closed");
        }
    }
}

impl Drop for ListenerLease {
    fn drop(&mut self) {
        self.close();
    }
}

async fn bind_first_free(start: u16, attempts: u16) -> Result<(TcpListener, u16), AuthError> {
    let end = start.saturating_add(attempts.saturating_sub(1));
    for port in start..=end {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => debug!(port, error = %e, "Port unavailable"),
        }
    }
    Err(AuthError::PortExhausted { start, end })
}

// ---------------------------------------------------------------------------
// Configuration role
// ---------------------------------------------------------------------------

fn config_router(slot: ResultSlot) -> Router {
    Router::new()
        .route("/", get(config_index))
        .route("/submit", get(config_submit))
        .fallback(not_found)
        .with_state(slot)
}

async fn config_index() -> Html<&'static str> {
    Html(pages::CONFIG_PAGE)
}

async fn config_submit(
    State(slot): State<ResultSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    match params.get("consumer_key").filter(|k| !k.is_empty()) {
        Some(key) => {
            fire(&slot, key.clone()).await;
            (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Configuration saved" })),
            )
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Invalid Consumer Key" })),
        ),
    }
}

// ---------------------------------------------------------------------------
// Selector role
// ---------------------------------------------------------------------------

fn selector_router(slot: ResultSlot) -> Router {
    Router::new()
        .route("/", get(selector_index))
        .route("/select", get(selector_select))
        .fallback(not_found)
        .with_state(slot)
}

async fn selector_index() -> Html<&'static str> {
    Html(pages::SELECTOR_PAGE)
}

async fn selector_select(
    State(slot): State<ResultSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    match params.get("env") {
        Some(env) => {
            fire(&slot, env.clone()).await;
            (StatusCode::OK, Json(json!({ "status": "ok" })))
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "message": "No environment specified" })),
        ),
    }
}

// ---------------------------------------------------------------------------
// Callback role
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct CallbackState {
    slot: ResultSlot,
    port: u16,
}

fn callback_router(slot: ResultSlot, port: u16) -> Router {
    Router::new()
        .route("/", get(callback_root))
        .fallback(not_found)
        .with_state(CallbackState { slot, port })
}

/// Two-hop fragment capture.
///
/// The provider redirects with the token in the URL fragment, which the
/// browser never sends to us. The first request therefore gets a page whose
/// script re-submits `window.location.hash` as `/?hash=...`; that second
/// request reconstructs the full callback URL and fires the event. A token
/// delivered straight in the query string (some providers fall back to
/// that) is accepted too.
async fn callback_root(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
    RawQuery(raw_query): RawQuery,
) -> impl IntoResponse {
    if let Some(fragment) = params.get("hash") {
        let full_url = format!("http://localhost:{}/#{}", state.port, fragment);
        debug!("Received hash fragment via query parameter");
        fire(&state.slot, full_url).await;
        return pages::CALLBACK_DONE.into_response();
    }

    if params.contains_key("access_token") {
        // Defensive: fragment-style payload arrived as the query itself.
        let query = raw_query.unwrap_or_default();
        let full_url = format!("http://localhost:{}/#{}", state.port, query);
        debug!("Received fragment parameters directly");
        fire(&state.slot, full_url).await;
        return pages::CALLBACK_DONE.into_response();
    }

    debug!("Serving OAuth callback relay page");
    Html(pages::CALLBACK_RELAY_PAGE).into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_text(url: &str) -> (reqwest::StatusCode, String) {
        let response = reqwest::get(url).await.expect("request");
        let status = response.status();
        (status, response.text().await.expect("body"))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn config_lease_captures_submitted_key() {
        let mut lease = ListenerLease::bind_at(ListenerRole::Config, 18801, 5)
            .await
            .expect("bind");
        let base = format!("http://127.0.0.1:{}", lease.port());

        let (status, body) = get_text(&base).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.contains("Consumer Key"));

        let (status, body) = get_text(&format!("{base}/submit?consumer_key=abcdefghij")).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.contains("\"success\":true"));

        let result = lease.await_result(Duration::from_secs(5)).await;
        assert_eq!(result.as_deref(), Some("abcdefghij"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn config_lease_rejects_missing_key() {
        let mut lease = ListenerLease::bind_at(ListenerRole::Config, 18811, 5)
            .await
            .expect("bind");
        let base = format!("http://127.0.0.1:{}", lease.port());

        let (status, body) = get_text(&format!("{base}/submit")).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid Consumer Key"));

        let (status, _) = get_text(&format!("{base}/nope")).await;
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

        assert!(lease.await_result(Duration::from_millis(100)).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn selector_lease_captures_choice() {
        let mut lease = ListenerLease::bind_at(ListenerRole::Selector, 18821, 5)
            .await
            .expect("bind");
        let base = format!("http://127.0.0.1:{}", lease.port());

        let (status, body) = get_text(&format!("{base}/select?env=sandbox")).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));

        let result = lease.await_result(Duration::from_secs(5)).await;
        assert_eq!(result.as_deref(), Some("sandbox"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn selector_lease_requires_env_parameter() {
        let lease = ListenerLease::bind_at(ListenerRole::Selector, 18831, 5)
            .await
            .expect("bind");
        let base = format!("http://127.0.0.1:{}", lease.port());

        let (status, body) = get_text(&format!("{base}/select")).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert!(body.contains("No environment specified"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn callback_lease_reconstructs_fragment_url() {
        let mut lease = ListenerLease::bind_at(ListenerRole::Callback, 18841, 5)
            .await
            .expect("bind");
        let port = lease.port();
        let base = format!("http://127.0.0.1:{port}");

        // First hop: the relay page.
        let (status, body) = get_text(&base).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.contains("window.location.hash"));

        // Second hop: the script re-submits the fragment.
        let (status, body) =
            get_text(&format!("{base}/?hash=access_token%3DA%26state%3DS")).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.contains("Authentication successful"));

        let result = lease.await_result(Duration::from_secs(5)).await;
        assert_eq!(
            result.as_deref(),
            Some(format!("http://localhost:{port}/#access_token=A&state=S").as_str())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn callback_lease_accepts_query_delivered_tokens() {
        let mut lease = ListenerLease::bind_at(ListenerRole::Callback, 18851, 5)
            .await
            .expect("bind");
        let port = lease.port();

        let url = format!("http://127.0.0.1:{port}/?access_token=A&instance_url=U&state=S");
        let (status, _) = get_text(&url).await;
        assert_eq!(status, reqwest::StatusCode::OK);

        let result = lease.await_result(Duration::from_secs(5)).await;
        assert_eq!(
            result.as_deref(),
            Some(format!("http://localhost:{port}/#access_token=A&instance_url=U&state=S").as_str())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scan_picks_first_free_port_and_exhausts() {
        let lease = ListenerLease::bind_at(ListenerRole::Selector, 18861, 10)
            .await
            .expect("bind");
        assert_eq!(lease.port(), 18861);

        // Occupy the whole scan range, then expect exhaustion.
        let mut held = Vec::new();
        for port in 18871..18881u16 {
            held.push(
                TcpListener::bind(("127.0.0.1", port))
                    .await
                    .expect("occupy port"),
            );
        }
        let err = ListenerLease::bind_at(ListenerRole::Selector, 18871, 10)
            .await
            .expect_err("range occupied");
        assert!(matches!(
            err,
            AuthError::PortExhausted { start: 18871, end: 18880 }
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_is_idempotent_and_releases_the_port() {
        let mut lease = ListenerLease::bind_at(ListenerRole::Config, 18891, 5)
            .await
            .expect("bind");
        let port = lease.port();
        lease.close();
        lease.close();

        // The accept task is aborted; the port becomes bindable again.
        let mut rebound = None;
        for _ in 0..50 {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(l) => {
                    rebound = Some(l);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        assert!(rebound.is_some(), "port was not released after close()");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn await_result_times_out() {
        let mut lease = ListenerLease::bind_at(ListenerRole::Selector, 18911, 5)
            .await
            .expect("bind");
        let started = std::time::Instant::now();
        assert!(lease.await_result(Duration::from_millis(50)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
