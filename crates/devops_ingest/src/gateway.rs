//! Request gateway: every outbound call to Azure DevOps goes through here.
//!
//! The gateway layers, in order:
//! - the shared [`ApiRateLimiter`] budget, acquired before every attempt
//! - 429 handling: sleep for `Retry-After` (or a fallback) and re-issue
//! - transient retries (connection errors, 5xx) with multiplicative backoff
//! - a one-time switch to the alternate base URL when the primary 401/404s
//!
//! # Example
//!
//! ```ignore
//! use devops_ingest::gateway::{ApiRequest, GatewayConfig, RequestGateway, UrlForm};
//!
//! let gateway = RequestGateway::new(
//!     transport,
//!     UrlForm::dev_azure("contoso", "Fabrikam"),
//!     auth_header,
//!     GatewayConfig::default(),
//! )
//! .with_alternate(UrlForm::visual_studio("contoso", "Fabrikam"));
//!
//! let response = gateway.call(&ApiRequest::get("_apis/wit/workitems").param("ids", "1,2")).await?;
//! ```

mod base_url;
mod errors;
mod rate_limit;
mod sleeper;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::retry::RetryConfig;
use crate::sync::{ProgressCallback, SyncProgress, emit};

pub use base_url::{AlternatePolicy, Scope, UrlForm, triggers_alternate};
pub use errors::{RemoteRequestError, short_error_message};
pub use rate_limit::{
    ApiRateLimiter, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_RETRY_AFTER_SECS, parse_retry_after,
    retry_after_from_response,
};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};

/// Main REST API version.
pub const API_VERSION: &str = "7.0";

/// Version required by preview-only endpoints such as work item comments.
pub const PREVIEW_API_VERSION: &str = "7.0-preview";

/// How many consecutive 429s a single request will wait out.
pub const MAX_RATE_LIMIT_WAITS: usize = 5;

/// A request relative to the active base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub scope: Scope,
    /// Overrides the gateway's default `api-version`.
    pub api_version: Option<String>,
}

impl ApiRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            endpoint: endpoint.into(),
            params: Vec::new(),
            body: None,
            scope: Scope::Project,
            api_version: None,
        }
    }

    pub fn post(endpoint: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(endpoint)
        }
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }
}

/// Tunables for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_version: String,
    pub requests_per_second: u32,
    pub retry: RetryConfig,
    /// Wait used when a 429 carries no `Retry-After`.
    pub default_retry_after: Duration,
    pub max_rate_limit_waits: usize,
    pub alternate_policy: AlternatePolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            retry: RetryConfig::default(),
            default_retry_after: Duration::from_secs(DEFAULT_RETRY_AFTER_SECS),
            max_rate_limit_waits: MAX_RATE_LIMIT_WAITS,
            alternate_policy: AlternatePolicy::default(),
        }
    }
}

/// Rate-limited, retrying client for one organization/project pair.
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    limiter: ApiRateLimiter,
    config: GatewayConfig,
    auth_header: String,
    alternate: Option<UrlForm>,
    active: RwLock<UrlForm>,
    alternate_tried: AtomicBool,
    on_progress: Option<ProgressCallback>,
}

impl RequestGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        primary: UrlForm,
        auth_header: String,
        config: GatewayConfig,
    ) -> Self {
        Self {
            transport,
            sleeper: Arc::new(TokioSleeper),
            limiter: ApiRateLimiter::new(config.requests_per_second),
            config,
            auth_header,
            alternate: None,
            active: RwLock::new(primary),
            alternate_tried: AtomicBool::new(false),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_alternate(mut self, alternate: UrlForm) -> Self {
        self.alternate = Some(alternate);
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// The URL form currently in use (changes at most once per session).
    #[must_use]
    pub fn active_form(&self) -> UrlForm {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Project root of the active URL form, used for document links.
    #[must_use]
    pub fn project_url(&self) -> String {
        self.active_form().project
    }

    /// Issue `request` and return the successful response.
    ///
    /// Non-2xx outcomes (after retries and the alternate URL) become
    /// [`RemoteRequestError`]s listing every URL attempted.
    pub async fn call(&self, request: &ApiRequest) -> Result<HttpResponse, RemoteRequestError> {
        let mut attempted = Vec::new();
        let active = self.active_form();
        let url = self.build_url(&active, request)?;

        let response = self.send_with_retry(request, &url, &mut attempted).await?;
        if response.is_success() {
            return Ok(response);
        }

        if triggers_alternate(response.status)
            && let Some(alternate) = self.untried_alternate(&active)
        {
            let alternate_url = self.build_url(&alternate, request)?;
            tracing::info!(
                status = response.status,
                alternate = %alternate.root(request.scope),
                "Primary base URL rejected request, trying alternate"
            );

            match self
                .send_with_retry(request, &alternate_url, &mut attempted)
                .await
            {
                Ok(alt)
                    if self
                        .config
                        .alternate_policy
                        .prefers_alternate(response.status, alt.status) =>
                {
                    self.adopt(alternate);
                    if alt.is_success() {
                        return Ok(alt);
                    }
                    return Err(RemoteRequestError::from_response(&alt, attempted));
                }
                Ok(alt) => {
                    tracing::debug!(status = alt.status, "Alternate base URL did no better");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Alternate base URL failed");
                }
            }
        }

        Err(RemoteRequestError::from_response(&response, attempted))
    }

    /// [`call`](Self::call) and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, RemoteRequestError> {
        let response = self.call(request).await?;
        serde_json::from_slice(&response.body).map_err(|source| RemoteRequestError::Decode {
            endpoint: request.endpoint.clone(),
            source,
        })
    }

    fn untried_alternate(&self, active: &UrlForm) -> Option<UrlForm> {
        if !self.config.alternate_policy.is_enabled() {
            return None;
        }
        let alternate = self.alternate.as_ref()?;
        if alternate == active || self.alternate_tried.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(alternate.clone())
    }

    fn adopt(&self, form: UrlForm) {
        tracing::warn!(
            base_url = %form.project,
            "Switching to alternate base URL for this session"
        );
        emit(
            self.on_progress.as_ref(),
            SyncProgress::AlternateUrlAdopted {
                base_url: form.project.clone(),
            },
        );
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = form;
    }

    fn build_url(
        &self,
        form: &UrlForm,
        request: &ApiRequest,
    ) -> Result<String, RemoteRequestError> {
        let joined = form.join(request.scope, &request.endpoint);
        let mut url = url::Url::parse(&joined).map_err(|e| RemoteRequestError::Transport {
            message: format!("invalid URL {joined}: {e}"),
            attempted: vec![joined.clone()],
        })?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &request.params {
                query.append_pair(key, value);
            }
            let version = request
                .api_version
                .as_deref()
                .unwrap_or(&self.config.api_version);
            query.append_pair("api-version", version);
        }
        Ok(url.into())
    }

    fn http_request(&self, request: &ApiRequest, url: &str) -> HttpRequest {
        let mut headers = vec![
            ("Authorization".to_string(), self.auth_header.clone()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        let body = match &request.body {
            Some(body) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                body.to_string().into_bytes()
            }
            None => Vec::new(),
        };
        HttpRequest {
            method: request.method,
            url: url.to_string(),
            headers,
            body,
        }
    }

    /// Send to one URL, absorbing 429s and transient failures.
    ///
    /// Returns the first non-retryable response, which may be a non-2xx.
    async fn send_with_retry(
        &self,
        request: &ApiRequest,
        url: &str,
        attempted: &mut Vec<String>,
    ) -> Result<HttpResponse, RemoteRequestError> {
        if !attempted.iter().any(|u| u == url) {
            attempted.push(url.to_string());
        }

        let mut delays = self.config.retry.delays();
        let mut rate_limit_waits = 0usize;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.wait().await;

            match self.transport.send(self.http_request(request, url)).await {
                Ok(response) if response.status == 429 => {
                    let wait =
                        retry_after_from_response(&response, self.config.default_retry_after);
                    if rate_limit_waits >= self.config.max_rate_limit_waits {
                        return Err(RemoteRequestError::RateLimited {
                            retry_after: Some(wait),
                            attempted: attempted.clone(),
                        });
                    }
                    rate_limit_waits += 1;
                    tracing::warn!(
                        endpoint = %request.endpoint,
                        wait_ms = wait.as_millis() as u64,
                        attempt,
                        "Rate limited, waiting before retry"
                    );
                    emit(
                        self.on_progress.as_ref(),
                        SyncProgress::RateLimited {
                            endpoint: request.endpoint.clone(),
                            retry_after_ms: wait.as_millis() as u64,
                            attempt,
                        },
                    );
                    self.sleeper.sleep(wait).await;
                }
                Ok(response) if self.config.retry.is_transient_status(response.status) => {
                    match delays.next() {
                        Some(delay) => {
                            self.back_off(request, Some(response.status), delay, attempt)
                                .await;
                        }
                        None => return Ok(response),
                    }
                }
                Ok(response) => return Ok(response),
                Err(e) => match delays.next() {
                    Some(delay) => {
                        tracing::debug!(error = %e, "Transport error");
                        self.back_off(request, None, delay, attempt).await;
                    }
                    None => {
                        return Err(RemoteRequestError::Transport {
                            message: e.to_string(),
                            attempted: attempted.clone(),
                        });
                    }
                },
            }
        }
    }

    async fn back_off(
        &self,
        request: &ApiRequest,
        status: Option<u16>,
        delay: Duration,
        attempt: u32,
    ) {
        tracing::debug!(
            endpoint = %request.endpoint,
            status = ?status,
            delay_ms = delay.as_millis() as u64,
            attempt,
            "Transient failure, backing off"
        );
        emit(
            self.on_progress.as_ref(),
            SyncProgress::RetryBackoff {
                endpoint: request.endpoint.clone(),
                status,
                delay_ms: delay.as_millis() as u64,
                attempt,
            },
        );
        self.sleeper.sleep(delay).await;
    }
}
