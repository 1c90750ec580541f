//! HTTP client facade
//!
//! `ApiClient::execute` is the only way requests leave the process. Each call
//! resolves exactly once: the response on 2xx, otherwise one `ApiError`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use session_auth::{DEFAULT_BASE_URL, DEFAULT_REFRESH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, SessionStore};
use tracing::{debug, instrument, warn};

use crate::authorize::{ExemptionSet, authorize};
use crate::coordinator::{HttpTokenRefresher, RefreshCoordinator, SessionEvent, TokenRefresher};
use crate::error::{ApiError, ErrorKind, Result};
use crate::normalize::ErrorNormalizer;
use crate::request::{ApiRequest, ApiResponse};

/// Client settings, fixed at construction.
#[derive(Clone)]
pub struct ClientConfig {
    /// Prefix for every request path, e.g. `http://localhost:8000/api`
    pub base_url: String,
    /// Per-request timeout unless the request overrides it
    pub timeout: Duration,
    /// Timeout for the refresh exchange
    pub refresh_timeout: Duration,
    pub exemptions: ExemptionSet,
    pub normalizer: ErrorNormalizer,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            exemptions: ExemptionSet::default(),
            normalizer: ErrorNormalizer::default(),
        }
    }
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    exemptions: ExemptionSet,
    normalizer: ErrorNormalizer,
    coordinator: RefreshCoordinator,
}

/// Session-aware API client. Clones share the connection pool and the
/// refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Client that refreshes against the configured base URL.
    pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::network(format!("failed to build HTTP client: {e}")))?;
        let refresher = Arc::new(HttpTokenRefresher::new(
            http.clone(),
            &config.base_url,
            config.refresh_timeout,
        ));
        Ok(Self::assemble(http, config, store, refresher))
    }

    /// Client with a custom refresh exchange.
    pub fn with_refresher(
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::assemble(http, config, store, refresher))
    }

    fn assemble(
        http: reqwest::Client,
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                timeout: config.timeout,
                exemptions: config.exemptions,
                normalizer: config.normalizer,
                coordinator: RefreshCoordinator::new(store, refresher),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Session notifications, including the re-authentication signal.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.inner.coordinator.subscribe()
    }

    /// Issue `request` and resolve it exactly once.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.execute_traced(request, request_id).await
    }

    /// `execute`, then decode the body as JSON.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.execute(ApiRequest::post(path).json(body)).await?.json()
    }

    pub async fn put_json(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.execute(ApiRequest::put(path).json(body)).await?.json()
    }

    pub async fn patch_json(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.execute(ApiRequest::patch(path).json(body)).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(ApiRequest::delete(path)).await.map(|_| ())
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = request.path()))]
    async fn execute_traced(&self, mut request: ApiRequest, request_id: String) -> Result<ApiResponse> {
        let inner = &self.inner;
        let exempt = inner.exemptions.is_exempt(request.path());
        let mut snapshot = inner.coordinator.snapshot().await;

        loop {
            let outgoing = authorize(request.clone(), snapshot.credential.as_ref(), &inner.exemptions);
            let (status, headers, body) = match self.send(&outgoing).await {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(error = %e, "request failed without a response");
                    crate::metrics::record_error(e.kind);
                    return Err(e);
                }
            };

            if status.is_success() {
                debug!(status = status.as_u16(), "request succeeded");
                return Ok(ApiResponse::new(status, headers, body));
            }

            if status == StatusCode::UNAUTHORIZED && !exempt && !request.is_retried() {
                request.mark_retried();
                let credential = match inner.coordinator.recover(&snapshot).await {
                    Ok(credential) => credential,
                    Err(e) => {
                        crate::metrics::record_error(e.kind);
                        return Err(e);
                    }
                };
                debug!("replaying with refreshed credential");
                crate::metrics::record_replay();
                snapshot = snapshot.replay(credential);
                continue;
            }

            let err = inner.normalizer.normalize(status, &body, exempt);
            debug!(status = status.as_u16(), kind = %err.kind, "request rejected");
            crate::metrics::record_error(err.kind);
            return Err(err);
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<(StatusCode, HeaderMap, Bytes)> {
        let url = self.url_for(request)?;
        let timeout = request.timeout_override().unwrap_or(self.inner.timeout);

        let mut builder = self
            .inner
            .http
            .request(request.method().clone(), url)
            .headers(request.headers().clone())
            .timeout(timeout);
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&e, timeout))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, timeout))?;
        Ok((status, headers, body))
    }

    fn url_for(&self, request: &ApiRequest) -> Result<reqwest::Url> {
        let path = request.path();
        let separator = if path.starts_with('/') { "" } else { "/" };
        let raw = format!("{}{separator}{path}", self.inner.base_url);

        let mut url = reqwest::Url::parse(&raw).map_err(|e| {
            ApiError::new(ErrorKind::Validation, format!("invalid request URL {raw}: {e}"))
        })?;
        if !request.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_pairs());
        }
        Ok(url)
    }
}

fn transport_error(e: &reqwest::Error, timeout: Duration) -> ApiError {
    if e.is_timeout() {
        ApiError::network(format!("request timed out after {}ms", timeout.as_millis()))
    } else {
        ApiError::network(format!("request failed: {e}"))
    }
}
