//! Transport client: session lifecycle and batch upload.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──(complete credentials)──▶ Initializing ──▶ Ready
//!                                                  │
//!                                                  └──────▶ Failed
//! any ──(close)──▶ Closed
//! ```
//!
//! Exactly one session acquisition runs per client, started by the
//! constructor. Callers waiting for the session observe the state through a
//! watch channel, so a failed acquisition or a `close()` reaches every
//! waiter. A closed client is terminal; build a new one to start over.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};
use crate::store::SyncStore;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Observable state of a [`HdioClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Credentials were incomplete; no session will be acquired.
    Uninitialized,
    /// Session acquisition is in progress.
    Initializing,
    /// A session token is available.
    Ready,
    /// Session acquisition failed with this message.
    Failed(String),
    /// The client was closed.
    Closed,
}

impl ClientState {
    /// Returns true if no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientState::Uninitialized | ClientState::Failed(_) | ClientState::Closed
        )
    }
}

#[derive(Debug, Clone)]
enum Session {
    Uninitialized,
    Initializing,
    Ready(String),
    Failed(String),
    Closed,
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Identifier the upload was tagged with.
    pub request_id: String,
    /// Number of known entries the upload confirmed.
    pub entries: usize,
    /// Size of the uploaded batch in bytes.
    pub bytes: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Authenticated client for the HDIO API.
pub struct HdioClient {
    config: ClientConfig,
    http: Arc<dyn HttpClient>,
    session: Arc<watch::Sender<Session>>,
    cancel: CancellationToken,
}

impl HdioClient {
    /// Creates a client and, if the credentials are complete, starts session
    /// acquisition in the background.
    ///
    /// Must be called from within a Tokio runtime for acquisition to start;
    /// otherwise the client ends up `Failed`.
    pub fn new(config: ClientConfig, http: Arc<dyn HttpClient>) -> Self {
        Self::with_cancel(config, http, &CancellationToken::new())
    }

    /// Creates a client whose cancellation is tied to `parent`: cancelling
    /// the parent closes the client.
    pub fn with_cancel(
        config: ClientConfig,
        http: Arc<dyn HttpClient>,
        parent: &CancellationToken,
    ) -> Self {
        let (tx, _) = watch::channel(Session::Uninitialized);
        let client = Self {
            config,
            http,
            session: Arc::new(tx),
            cancel: parent.child_token(),
        };

        if client.config.is_complete() {
            client.start_initialization();
        } else {
            debug!("incomplete credentials, client stays uninitialized");
        }
        client
    }

    fn start_initialization(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.session.send_replace(Session::Failed(e.to_string()));
                return;
            }
        };
        self.session.send_replace(Session::Initializing);

        let config = self.config.clone();
        let http = Arc::clone(&self.http);
        let session = Arc::clone(&self.session);
        let cancel = self.cancel.clone();
        runtime.spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = acquire_session(&config, http.as_ref()) => result,
            };
            session.send_if_modified(|state| {
                if !matches!(state, Session::Initializing) {
                    return false;
                }
                *state = match result {
                    Ok(token) => {
                        info!(tenant = %config.tenant, "session acquired");
                        Session::Ready(token)
                    }
                    Err(e) => {
                        warn!(tenant = %config.tenant, error = %e, "session acquisition failed");
                        Session::Failed(e.to_string())
                    }
                };
                true
            });
        });
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> ClientState {
        match &*self.session.borrow() {
            Session::Uninitialized => ClientState::Uninitialized,
            Session::Initializing => ClientState::Initializing,
            Session::Ready(_) => ClientState::Ready,
            Session::Failed(message) => ClientState::Failed(message.clone()),
            Session::Closed => ClientState::Closed,
        }
    }

    /// Returns true once a session token is available.
    pub fn is_ready(&self) -> bool {
        self.state() == ClientState::Ready
    }

    /// Waits for the session and returns its token.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` if the credentials were incomplete.
    /// - `SessionFailed` if acquisition failed.
    /// - `ClientClosed` if the client is or becomes closed while waiting.
    pub async fn wait_ready(&self) -> SyncResult<String> {
        let mut rx = self.session.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                Session::Ready(token) => return Ok(token),
                Session::Failed(message) => return Err(SyncError::SessionFailed(message)),
                Session::Closed => return Err(SyncError::ClientClosed),
                Session::Uninitialized => return Err(SyncError::NotInitialized),
                Session::Initializing => {}
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(SyncError::ClientClosed);
                    }
                }
                _ = self.cancel.cancelled() => return Err(SyncError::ClientClosed),
            }
        }
    }

    /// Uploads the store's pending batch.
    ///
    /// Waits for the session if it is still being acquired. Every `parsed`
    /// entry is tagged with a fresh request identifier before the request is
    /// sent. On success those entries become `acknowledged`; on failure
    /// they go back to `parsed` and the error is returned.
    pub async fn post_batch(&self, store: &mut SyncStore) -> SyncResult<UploadReceipt> {
        let session = self.wait_ready().await?;

        let request_id = format!("requested-{}", Uuid::new_v4().simple());
        let tagged = store.mark_in_flight(&request_id);
        let body = store.pending_batch().to_vec();
        let bytes = body.len();

        let request = HttpRequest::new(Method::Post, format!("{}/hdio/files", self.config.api_base()))
            .with_header("Authorization", format!("Bearer {session}"))
            .with_header("content-type", "application/octet-stream")
            .with_body(body);

        info!(%request_id, entries = tagged, bytes, "uploading batch");
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(SyncError::ClientClosed),
            response = send(self.http.as_ref(), request, self.config.timeout) => {
                response.and_then(check_response)
            }
        };

        match result {
            Ok(_) => {
                let entries = store.acknowledge(&request_id)?;
                info!(%request_id, entries, "batch acknowledged");
                Ok(UploadReceipt {
                    request_id,
                    entries,
                    bytes,
                })
            }
            Err(e) => {
                let released = store.release(&request_id)?;
                warn!(%request_id, released, error = %e, "upload failed");
                Err(e)
            }
        }
    }

    /// Closes the client.
    ///
    /// Cancels a pending session acquisition and any upload in flight, and
    /// fails every waiter with `ClientClosed`.
    pub fn close(&self) {
        self.cancel.cancel();
        self.session.send_replace(Session::Closed);
        debug!(tenant = %self.config.tenant, "client closed");
    }

    /// Returns true if the client was closed.
    pub fn is_closed(&self) -> bool {
        self.state() == ClientState::Closed
    }
}

impl Drop for HdioClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for HdioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdioClient")
            .field("host", &self.config.host)
            .field("tenant", &self.config.tenant)
            .field("state", &self.state())
            .finish()
    }
}

/// Exchanges the tenant token for a session token.
///
/// `GET {host}/public/api/v1/{tenant}/sessions?tenant=..&token=..`; the
/// response body is the session token. Bounded by the configured timeout.
pub async fn acquire_session(config: &ClientConfig, http: &dyn HttpClient) -> SyncResult<String> {
    let mut url = Url::parse(&format!("{}/sessions", config.api_base()))
        .map_err(|e| SyncError::Config(format!("invalid host {:?}: {e}", config.host)))?;
    url.query_pairs_mut()
        .append_pair("tenant", &config.tenant)
        .append_pair("token", &config.token);

    let request = HttpRequest::new(Method::Get, url.as_str()).with_header("Session", "");
    let response = send(http, request, config.timeout).await?;
    let response = check_response(response)?;
    Ok(response.text())
}

/// Sends a request, failing with a transport error if no response arrives
/// within `timeout`.
async fn send(
    http: &dyn HttpClient,
    request: HttpRequest,
    timeout: Duration,
) -> SyncResult<HttpResponse> {
    let url = request.url.clone();
    match tokio::time::timeout(timeout, http.send(request)).await {
        Ok(response) => response.map_err(SyncError::network),
        Err(_) => {
            warn!(%url, ?timeout, "request timed out");
            Err(SyncError::network(format!(
                "request timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}

/// Turns a non-success response into a transport error carrying the
/// server-provided message, or the status text when there is none.
fn check_response(response: HttpResponse) -> SyncResult<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let message = serde_json::from_slice::<ErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| response.status_text.clone());
    Err(SyncError::http(response.status, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockHttpClient;
    use hdio_protocol::{Bundle, Connection, Document, FileStatus, Model};

    fn config() -> ClientConfig {
        ClientConfig::new("https://hdml.example.com", "acme", "tenant-token")
    }

    fn store_with_batch() -> SyncStore {
        let mut store = SyncStore::new();
        store
            .resolve(
                &Document::new()
                    .with(Connection::new("pg"))
                    .with(Model::new("users")),
            )
            .unwrap();
        store
    }

    #[test]
    fn error_body_message_wins() {
        let response = HttpResponse::with_status(
            403,
            "Forbidden",
            r#"{"statusCode":403,"message":"Invalid token"}"#,
        );
        let err = check_response(response).unwrap_err();
        assert_eq!(err, SyncError::http(403, "Invalid token"));
    }

    #[test]
    fn status_text_without_message() {
        let response = HttpResponse::with_status(502, "Bad Gateway", "<html>oops</html>");
        let err = check_response(response).unwrap_err();
        assert_eq!(err, SyncError::http(502, "Bad Gateway"));
    }

    #[tokio::test]
    async fn incomplete_credentials_stay_uninitialized() {
        let http = Arc::new(MockHttpClient::new());
        let client = HdioClient::new(ClientConfig::new("https://h", "", "t"), http.clone());

        assert_eq!(client.state(), ClientState::Uninitialized);
        let mut store = store_with_batch();
        let err = client.post_batch(&mut store).await.unwrap_err();
        assert_eq!(err, SyncError::NotInitialized);
        assert!(http.requests().is_empty());
        assert_eq!(store.known().count(&FileStatus::Parsed), 2);
    }

    #[tokio::test]
    async fn session_request_shape() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("session-1"));

        let client = HdioClient::new(config(), http.clone());
        assert_eq!(client.wait_ready().await.unwrap(), "session-1");
        assert!(client.is_ready());

        let requests = http.requests_to("/sessions");
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(
            request.url,
            "https://hdml.example.com/public/api/v1/acme/sessions?tenant=acme&token=tenant-token"
        );
        assert_eq!(request.header("Session"), Some(""));
    }

    #[tokio::test]
    async fn upload_request_shape_and_acknowledgement() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("session-1"));
        http.set_response("/hdio/files", HttpResponse::ok(""));

        let client = HdioClient::new(config(), http.clone());
        let mut store = store_with_batch();
        let receipt = client.post_batch(&mut store).await.unwrap();

        assert!(receipt.request_id.starts_with("requested-"));
        assert_eq!(receipt.entries, 2);
        assert_eq!(receipt.bytes, store.pending_batch().len());
        assert_eq!(store.known().count(&FileStatus::Acknowledged), 2);

        let uploads = http.requests_to("/hdio/files");
        assert_eq!(uploads.len(), 1);
        let upload = &uploads[0];
        assert_eq!(upload.method, Method::Post);
        assert_eq!(
            upload.url,
            "https://hdml.example.com/public/api/v1/acme/hdio/files"
        );
        assert_eq!(upload.header("Authorization"), Some("Bearer session-1"));
        assert_eq!(
            upload.header("content-type"),
            Some("application/octet-stream")
        );
        assert_eq!(upload.body, store.pending_batch());
    }

    #[tokio::test]
    async fn second_upload_carries_nothing_already_acknowledged() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("session-1"));
        http.set_response("/hdio/files", HttpResponse::ok(""));

        let client = HdioClient::new(config(), http.clone());
        let mut store = store_with_batch();
        client.post_batch(&mut store).await.unwrap();
        assert!(Bundle::unpack(store.pending_batch()).unwrap().is_empty());

        let receipt = client.post_batch(&mut store).await.unwrap();
        assert_eq!(receipt.entries, 0);

        let uploads = http.requests_to("/hdio/files");
        assert_eq!(uploads.len(), 2);
        assert_eq!(Bundle::unpack(&uploads[0].body).unwrap().len(), 2);
        assert!(Bundle::unpack(&uploads[1].body).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_session_request_times_out() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("never-delivered"));
        http.hold("/sessions");

        let client = HdioClient::new(
            config().with_timeout(Duration::from_millis(10)),
            http.clone(),
        );
        let err = client.wait_ready().await.unwrap_err();

        assert!(matches!(err, SyncError::SessionFailed(ref m) if m.contains("timed out")));
        assert!(matches!(client.state(), ClientState::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upload_times_out_and_releases_entries() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("session-1"));
        http.set_response("/hdio/files", HttpResponse::ok(""));
        http.hold("/hdio/files");

        let client = HdioClient::new(
            config().with_timeout(Duration::from_millis(10)),
            http.clone(),
        );
        let mut store = store_with_batch();
        let err = client.post_batch(&mut store).await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::Transport { status: None, ref message } if message.contains("timed out")
        ));
        assert_eq!(store.known().count(&FileStatus::Parsed), 2);
        assert_eq!(store.pending_count(), 2);
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn failed_upload_releases_entries() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("session-1"));
        http.set_response(
            "/hdio/files",
            HttpResponse::with_status(500, "Internal Server Error", r#"{"message":"disk full"}"#),
        );

        let client = HdioClient::new(config(), http);
        let mut store = store_with_batch();
        let err = client.post_batch(&mut store).await.unwrap_err();

        assert_eq!(err, SyncError::http(500, "disk full"));
        assert_eq!(store.known().count(&FileStatus::Parsed), 2);
        assert_eq!(store.known().count(&FileStatus::Acknowledged), 0);
    }

    #[tokio::test]
    async fn post_before_session_waits_for_it() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("late-session"));
        http.set_response("/hdio/files", HttpResponse::ok(""));
        http.hold("/sessions");

        let client = Arc::new(HdioClient::new(config(), http.clone()));
        assert_eq!(client.state(), ClientState::Initializing);

        let upload = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let mut store = store_with_batch();
                client.post_batch(&mut store).await
            })
        };

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!upload.is_finished());
        assert!(http.requests_to("/hdio/files").is_empty());

        http.release("/sessions");
        upload.await.unwrap().unwrap();

        let uploads = http.requests_to("/hdio/files");
        assert_eq!(uploads.len(), 1);
        assert_eq!(
            uploads[0].header("Authorization"),
            Some("Bearer late-session")
        );
        assert_eq!(http.requests_to("/sessions").len(), 1);
    }

    #[tokio::test]
    async fn session_failure_reaches_every_waiter() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response(
            "/sessions",
            HttpResponse::with_status(401, "Unauthorized", r#"{"message":"bad token"}"#),
        );
        http.hold("/sessions");

        let client = Arc::new(HdioClient::new(config(), http.clone()));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.wait_ready().await })
            })
            .collect();

        tokio::task::yield_now().await;
        http.release("/sessions");

        for waiter in waiters {
            let err = waiter.await.unwrap().unwrap_err();
            assert!(matches!(err, SyncError::SessionFailed(ref m) if m.contains("bad token")));
        }
        assert!(matches!(client.state(), ClientState::Failed(_)));
        assert_eq!(http.requests_to("/sessions").len(), 1);
    }

    #[tokio::test]
    async fn close_fails_pending_waiters() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("never-used"));
        http.hold("/sessions");

        let client = Arc::new(HdioClient::new(config(), http.clone()));
        let waiter = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.wait_ready().await })
        };
        tokio::task::yield_now().await;

        client.close();
        assert_eq!(waiter.await.unwrap(), Err(SyncError::ClientClosed));
        assert!(client.is_closed());

        // Releasing the held session afterwards does not revive the client.
        http.release("/sessions");
        tokio::task::yield_now().await;
        assert!(client.is_closed());

        let mut store = store_with_batch();
        assert_eq!(
            client.post_batch(&mut store).await,
            Err(SyncError::ClientClosed)
        );
    }

    #[tokio::test]
    async fn close_cancels_upload_in_flight() {
        let http = Arc::new(MockHttpClient::new());
        http.set_response("/sessions", HttpResponse::ok("session-1"));
        http.set_response("/hdio/files", HttpResponse::ok(""));
        http.hold("/hdio/files");

        let client = Arc::new(HdioClient::new(config(), http.clone()));
        client.wait_ready().await.unwrap();

        let upload = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let mut store = store_with_batch();
                let result = client.post_batch(&mut store).await;
                (result, store)
            })
        };
        while http.requests_to("/hdio/files").is_empty() {
            tokio::task::yield_now().await;
        }

        client.close();
        let (result, store) = upload.await.unwrap();
        assert_eq!(result, Err(SyncError::ClientClosed));
        assert_eq!(store.known().count(&FileStatus::Parsed), 2);
    }
}
