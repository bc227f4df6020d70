//! Authenticated request pipeline.
//!
//! Every outgoing API request flows through [`AuthPipeline::send`], which
//! attaches the current access token, interprets a 401 response, performs at
//! most one transparent refresh-and-retry, and ends the session when the
//! refresh path is unusable.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::auth::events::{ExpiryReason, SessionEvent, SessionEventBroadcaster};
use crate::auth::refresh;
use crate::auth::tokens::{TokenPair, TokenStore};
use crate::auth::transport::{ApiResponse, HttpTransport, RequestDescriptor};
use crate::error::ApiError;

/// What one dispatch attempt produced, before retry logic runs.
#[derive(Debug)]
pub enum SendOutcome {
    /// Any response other than 401; handed to the caller as-is.
    Completed(ApiResponse),
    /// The server rejected the access token.
    AuthRejected(ApiResponse),
    /// No response at all: timeout, DNS failure, refused connection.
    TransportFailed(ApiError),
}

/// What the pipeline does next after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Hand the result to the caller unmodified.
    Deliver,
    /// Run the refresh exchange, then retry the request once.
    RefreshAndRetry,
    /// No refresh path exists; clear tokens and fail.
    SessionExpired,
}

/// Sort one dispatch result into an outcome.
pub fn classify(result: Result<ApiResponse, ApiError>) -> SendOutcome {
    match result {
        Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
            SendOutcome::AuthRejected(response)
        }
        Ok(response) => SendOutcome::Completed(response),
        Err(e) => SendOutcome::TransportFailed(e),
    }
}

/// Decide the next step for an attempt.
///
/// Pure so the retry policy is testable without any I/O. Two rules live
/// here: transport failures never trigger a refresh, and once
/// `already_retried` is set even a fresh auth rejection is delivered rather
/// than retried.
pub fn decide(outcome: &SendOutcome, already_retried: bool, has_refresh: bool) -> RetryStep {
    match outcome {
        SendOutcome::Completed(_) | SendOutcome::TransportFailed(_) => RetryStep::Deliver,
        SendOutcome::AuthRejected(_) if already_retried => RetryStep::Deliver,
        SendOutcome::AuthRejected(_) if has_refresh => RetryStep::RefreshAndRetry,
        SendOutcome::AuthRejected(_) => RetryStep::SessionExpired,
    }
}

fn deliver(outcome: SendOutcome) -> Result<ApiResponse, ApiError> {
    match outcome {
        SendOutcome::Completed(r) | SendOutcome::AuthRejected(r) => Ok(r),
        SendOutcome::TransportFailed(e) => Err(e),
    }
}

/// The authenticated request pipeline.
///
/// Cheap to clone via the contained `Arc`s; clones share the token store,
/// event channel and refresh gate.
#[derive(Clone)]
pub struct AuthPipeline {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    events: SessionEventBroadcaster,
    /// Serializes refresh exchanges so concurrent 401s produce one exchange.
    refresh_gate: Arc<Mutex<()>>,
}

impl AuthPipeline {
    /// Create a pipeline over the given transport and token store.
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            transport,
            store,
            events: SessionEventBroadcaster::default(),
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The token store this pipeline reads and mutates.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The transport requests are dispatched through.
    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Install a credential pair after a successful login.
    pub async fn install_tokens(&self, pair: TokenPair) -> Result<(), ApiError> {
        self.store.save(&pair).await?;
        info!("credential pair installed");
        Ok(())
    }

    /// Clear the session locally.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.store.clear().await?;
        info!("session cleared");
        Ok(())
    }

    /// Send a request through the full auth flow.
    ///
    /// Returns the final response, including non-2xx statuses other than the
    /// handled 401 path; callers interpret domain errors themselves. Errors
    /// mean the request could not produce a response at all: transport
    /// failure, storage failure or an ended session.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let pair = self.store.load().await?;
        let access = pair.as_ref().map(|p| p.access.clone());
        let has_refresh = pair.as_ref().is_some_and(TokenPair::has_refresh_token);

        let outcome = classify(self.transport.execute(request, access.as_deref()).await);

        match decide(&outcome, request.retried, has_refresh) {
            RetryStep::Deliver => deliver(outcome),
            RetryStep::SessionExpired => {
                self.expire_session(ExpiryReason::NoRefreshToken).await;
                Err(ApiError::AuthExpired)
            }
            RetryStep::RefreshAndRetry => {
                debug!("access token rejected, attempting refresh");
                let fresh = self.refresh_access(&access.unwrap_or_default()).await?;

                let mut retry = request.clone();
                retry.retried = true;
                // A second rejection is delivered unmodified; decide() with
                // the retried flag set never asks for another refresh.
                deliver(classify(
                    self.transport.execute(&retry, Some(&fresh)).await,
                ))
            }
        }
    }

    /// Send a request and deserialize a successful JSON response.
    ///
    /// Non-2xx responses become [`ApiError::Status`].
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(ApiError::Status {
                status: response.status,
                body: response.text(),
            });
        }
        response.json()
    }

    /// GET a path and deserialize the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(&RequestDescriptor::get(path)).await
    }

    /// POST a JSON body and deserialize the JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(&RequestDescriptor::new(Method::POST, path).with_json(body)?)
            .await
    }

    /// Obtain a fresh access token, running at most one refresh exchange
    /// across all concurrent callers.
    ///
    /// `observed_access` is the token the caller saw rejected. After the gate
    /// is acquired the store is re-read: if the stored token already differs,
    /// another task completed the exchange and that token is returned without
    /// a second exchange.
    async fn refresh_access(&self, observed_access: &str) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        let pair = match self.store.load().await? {
            Some(pair) => pair,
            None => {
                // Another task already ended the session while we waited.
                return Err(ApiError::AuthExpired);
            }
        };

        if pair.access != observed_access {
            debug!("access token already refreshed by another request");
            return Ok(pair.access);
        }

        if !pair.has_refresh_token() {
            self.expire_session(ExpiryReason::NoRefreshToken).await;
            return Err(ApiError::AuthExpired);
        }

        match refresh::exchange(self.transport.as_ref(), &pair.refresh).await {
            Ok(access) => {
                self.store.update_access(&access).await?;
                self.events.access_refreshed();
                info!("access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "refresh exchange failed, ending session");
                self.expire_session(ExpiryReason::RefreshRejected).await;
                Err(e)
            }
        }
    }

    async fn expire_session(&self, reason: ExpiryReason) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear tokens while ending session");
        }
        self.events.session_expired(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::header::HeaderMap;

    use crate::auth::tokens::MemoryTokenStore;

    fn ok_response(body: &'static [u8]) -> ApiResponse {
        ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body),
        }
    }

    fn unauthorized() -> ApiResponse {
        ApiResponse {
            status: StatusCode::UNAUTHORIZED,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"detail": "token expired"}"#),
        }
    }

    fn network_loss() -> ApiError {
        ApiError::Storage("simulated transport loss".to_owned())
    }

    /// Transport driven by per-path scripts of canned results.
    struct ScriptedTransport {
        api_script: std::sync::Mutex<VecDeque<Result<ApiResponse, ApiError>>>,
        refresh_script: std::sync::Mutex<VecDeque<Result<ApiResponse, ApiError>>>,
        api_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        bearers: std::sync::Mutex<Vec<Option<String>>>,
    }

    impl ScriptedTransport {
        fn new(
            api: Vec<Result<ApiResponse, ApiError>>,
            refresh: Vec<Result<ApiResponse, ApiError>>,
        ) -> Self {
            Self {
                api_script: std::sync::Mutex::new(api.into()),
                refresh_script: std::sync::Mutex::new(refresh.into()),
                api_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                bearers: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(
            &self,
            request: &RequestDescriptor,
            bearer: Option<&str>,
        ) -> Result<ApiResponse, ApiError> {
            let script = if request.path == refresh::REFRESH_PATH {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                &self.refresh_script
            } else {
                self.api_calls.fetch_add(1, Ordering::SeqCst);
                self.bearers
                    .lock()
                    .unwrap()
                    .push(bearer.map(str::to_owned));
                &self.api_script
            };
            script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")
        }
    }

    fn pipeline_with(
        transport: ScriptedTransport,
        pair: Option<TokenPair>,
    ) -> (AuthPipeline, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let store: Arc<dyn TokenStore> = Arc::new(match pair {
            Some(pair) => MemoryTokenStore::with_pair(pair),
            None => MemoryTokenStore::new(),
        });
        (
            AuthPipeline::new(transport.clone(), store),
            transport,
        )
    }

    #[test]
    fn test_decide_table() {
        let completed = SendOutcome::Completed(ok_response(b"{}"));
        let rejected = SendOutcome::AuthRejected(unauthorized());
        let failed = SendOutcome::TransportFailed(network_loss());

        assert_eq!(decide(&completed, false, true), RetryStep::Deliver);
        assert_eq!(decide(&completed, true, false), RetryStep::Deliver);
        assert_eq!(decide(&rejected, false, true), RetryStep::RefreshAndRetry);
        assert_eq!(decide(&rejected, false, false), RetryStep::SessionExpired);
        // Single-retry invariant: an already-retried rejection is delivered.
        assert_eq!(decide(&rejected, true, true), RetryStep::Deliver);
        // Transport failures never touch the refresh path.
        assert_eq!(decide(&failed, false, true), RetryStep::Deliver);
    }

    #[test]
    fn test_classify_sorts_by_status_and_error() {
        assert!(matches!(
            classify(Ok(ok_response(b"{}"))),
            SendOutcome::Completed(_)
        ));
        assert!(matches!(
            classify(Ok(unauthorized())),
            SendOutcome::AuthRejected(_)
        ));
        assert!(matches!(
            classify(Err(network_loss())),
            SendOutcome::TransportFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_happy_path_attaches_bearer() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(vec![Ok(ok_response(br#"{"ok": true}"#))], vec![]),
            Some(TokenPair::new("a1", "r1")),
        );

        let response = pipeline
            .send(&RequestDescriptor::get("/api/students/"))
            .await
            .unwrap();
        assert!(response.is_success());

        assert_eq!(transport.api_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            transport.bearers.lock().unwrap().as_slice(),
            &[Some("a1".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_401_refreshes_and_retries_once() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(
                vec![Ok(unauthorized()), Ok(ok_response(br#"{"ok": true}"#))],
                vec![Ok(ok_response(br#"{"access": "a2"}"#))],
            ),
            Some(TokenPair::new("a1", "r1")),
        );

        let response = pipeline
            .send(&RequestDescriptor::get("/api/students/"))
            .await
            .unwrap();
        assert!(response.is_success());

        assert_eq!(transport.api_calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.bearers.lock().unwrap().as_slice(),
            &[Some("a1".to_owned()), Some("a2".to_owned())]
        );

        // The store now carries the refreshed access token.
        let stored = pipeline.store().load().await.unwrap().unwrap();
        assert_eq!(stored.access, "a2");
        assert_eq!(stored.refresh, "r1");
    }

    #[tokio::test]
    async fn test_second_401_is_delivered_and_session_survives() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(
                vec![Ok(unauthorized()), Ok(unauthorized())],
                vec![Ok(ok_response(br#"{"access": "a2"}"#))],
            ),
            Some(TokenPair::new("a1", "r1")),
        );

        let response = pipeline
            .send(&RequestDescriptor::get("/api/students/"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        assert_eq!(transport.api_calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
        // Tokens remain installed; the retry delivered, nothing expired.
        assert!(pipeline.store().load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_expires_session() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(vec![Ok(unauthorized())], vec![]),
            Some(TokenPair::new("a1", "")),
        );
        let mut events = pipeline.subscribe();

        let err = pipeline
            .send(&RequestDescriptor::get("/api/students/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired));
        assert!(err.requires_relogin());

        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.store().load().await.unwrap().is_none());
        match events.recv().await.unwrap() {
            SessionEvent::Expired { reason, .. } => {
                assert_eq!(reason, ExpiryReason::NoRefreshToken);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_refresh_expires_session() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(vec![Ok(unauthorized())], vec![Ok(unauthorized())]),
            Some(TokenPair::new("a1", "r1")),
        );
        let mut events = pipeline.subscribe();

        let err = pipeline
            .send(&RequestDescriptor::get("/api/students/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed(_)));

        // Only the initial attempt reached the API; the retry never ran.
        assert_eq!(transport.api_calls.load(Ordering::SeqCst), 1);
        assert!(pipeline.store().load().await.unwrap().is_none());
        match events.recv().await.unwrap() {
            SessionEvent::Expired { reason, .. } => {
                assert_eq!(reason, ExpiryReason::RefreshRejected);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_network_error_propagates_without_refresh() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(vec![Err(network_loss())], vec![]),
            Some(TokenPair::new("a1", "r1")),
        );

        let err = pipeline
            .send(&RequestDescriptor::get("/api/students/"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));

        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 0);
        // Tokens are untouched; a flaky network must not end the session.
        assert!(pipeline.store().load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_request_without_tokens_goes_out_anonymous() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(vec![Ok(ok_response(br#"{"pong": true}"#))], vec![]),
            None,
        );

        pipeline
            .send(&RequestDescriptor::get("/api/ping"))
            .await
            .unwrap();
        assert_eq!(transport.bearers.lock().unwrap().as_slice(), &[None]);
    }

    #[tokio::test]
    async fn test_send_json_maps_domain_failures_to_status() {
        let (pipeline, _transport) = pipeline_with(
            ScriptedTransport::new(
                vec![Ok(ApiResponse {
                    status: StatusCode::NOT_FOUND,
                    headers: HeaderMap::new(),
                    body: Bytes::from_static(b"missing"),
                })],
                vec![],
            ),
            Some(TokenPair::new("a1", "r1")),
        );

        let err = pipeline
            .get_json::<serde_json::Value>("/api/students/999/")
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_double_check_skips_second_exchange() {
        // Two sequential rejected requests observing the same stale token:
        // the second must reuse the already-refreshed token from the store.
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(
                vec![],
                vec![Ok(ok_response(br#"{"access": "a2"}"#))],
            ),
            Some(TokenPair::new("a1", "r1")),
        );

        let first = pipeline.refresh_access("a1").await.unwrap();
        let second = pipeline.refresh_access("a1").await.unwrap();
        assert_eq!(first, "a2");
        assert_eq!(second, "a2");
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_run_one_exchange() {
        let (pipeline, transport) = pipeline_with(
            ScriptedTransport::new(
                vec![],
                vec![Ok(ok_response(br#"{"access": "a2"}"#))],
            ),
            Some(TokenPair::new("a1", "r1")),
        );

        let (a, b) = tokio::join!(
            pipeline.refresh_access("a1"),
            pipeline.refresh_access("a1")
        );
        assert_eq!(a.unwrap(), "a2");
        assert_eq!(b.unwrap(), "a2");
        assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
    }
}
