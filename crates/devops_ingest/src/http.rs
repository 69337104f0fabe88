//! HTTP boundary for every request the connector makes.
//!
//! All remote I/O goes through [`HttpTransport`], so the gateway and everything
//! above it can be exercised against an in-memory transport in tests.

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;

/// HTTP methods used by the Azure DevOps REST surface we consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Header pairs in wire order; lookups through [`header_get`] ignore case.
pub type HttpHeaders = Vec<(String, String)>;

/// A fully-resolved outbound request (absolute URL, query string included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

/// Status, headers and the fully-buffered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Build a JSON response. Mostly useful for fakes.
    #[must_use]
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: value.to_string().into_bytes(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no mock response registered for {method} {url}")]
    NoMockResponse { method: String, url: String },
}

/// Sends one request. Retries, rate limiting and auth live above this.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// First value for `name`, compared case-insensitively.
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// `Authorization` header value for HTTP basic auth.
///
/// Personal access tokens are sent with an empty user name.
#[must_use]
pub fn basic_auth_header(user: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}").as_bytes());
    format!("Basic {encoded}")
}

pub mod reqwest_transport {
    use super::*;

    use std::time::Duration as StdDuration;

    use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

    const USER_AGENT: &str = concat!("devops-ingest/", env!("CARGO_PKG_VERSION"));

    /// Production transport over a pooled reqwest client.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        /// Client that asks for JSON, identifies itself, and gives up on a
        /// single request after `timeout`.
        pub fn with_timeout(timeout: StdDuration) -> Result<Self, HttpError> {
            let mut defaults = HeaderMap::new();
            defaults.insert(ACCEPT, HeaderValue::from_static("application/json"));
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .default_headers(defaults)
                .build()
                .map_err(transport_error)?;
            Ok(Self { client })
        }
    }

    fn transport_error(e: reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Transport(format!("request timed out: {e}"))
        } else {
            HttpError::Transport(e.to_string())
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let HttpRequest {
                method,
                url,
                headers,
                body,
            } = request;
            let method = match method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
            };

            let builder = headers
                .iter()
                .fold(self.client.request(method, &url), |b, (k, v)| {
                    b.header(k.as_str(), v.as_str())
                });
            let builder = if body.is_empty() {
                builder
            } else {
                builder.body(body)
            };

            let resp = builder.send().await.map_err(transport_error)?;
            let status = resp.status().as_u16();
            let headers: HttpHeaders = resp
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
                })
                .collect();
            let body = resp.bytes().await.map_err(transport_error)?.to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
pub use mock::{MockTransport, query_param};

#[cfg(test)]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::*;

    type Route = (HttpMethod, String);

    /// Scripted transport for unit tests.
    ///
    /// A request is answered from the queue registered for its exact URL, or
    /// failing that, for its URL without the query string. Every request is
    /// recorded, answered or not.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<Script>>,
    }

    #[derive(Default)]
    struct Script {
        routes: HashMap<Route, VecDeque<HttpResponse>>,
        requests: Vec<HttpRequest>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn script(&self) -> MutexGuard<'_, Script> {
            self.inner.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Queue `response` for `method url`; repeated keys answer in FIFO order.
        pub fn push_response(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            response: HttpResponse,
        ) {
            self.script()
                .routes
                .entry((method, url.into()))
                .or_default()
                .push_back(response);
        }

        pub fn push_json(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            status: u16,
            body: serde_json::Value,
        ) {
            self.push_response(method, url, HttpResponse::json(status, &body));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.script().requests.clone()
        }

        /// Requests whose path (query stripped) ends with `suffix`.
        pub fn requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
            self.script()
                .requests
                .iter()
                .filter(|r| strip_query(&r.url).ends_with(suffix))
                .cloned()
                .collect()
        }
    }

    fn strip_query(url: &str) -> &str {
        url.split_once('?').map_or(url, |(path, _)| path)
    }

    /// Decoded value of query parameter `name`.
    pub fn query_param(url: &str, name: &str) -> Option<String> {
        url::Url::parse(url)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut script = self.script();
            let exact: Route = (request.method, request.url.clone());
            let bare: Route = (request.method, strip_query(&request.url).to_string());
            script.requests.push(request);

            [exact.clone(), bare]
                .iter()
                .find_map(|key| script.routes.get_mut(key).and_then(VecDeque::pop_front))
                .ok_or_else(|| HttpError::NoMockResponse {
                    method: exact.0.as_str().to_string(),
                    url: exact.1,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_get_is_case_insensitive_and_returns_first_match() {
        let headers: HttpHeaders = vec![
            ("Retry-After".to_string(), "2".to_string()),
            ("retry-after".to_string(), "5".to_string()),
        ];
        assert_eq!(header_get(&headers, "retry-after"), Some("2"));
        assert_eq!(header_get(&headers, "RETRY-AFTER"), Some("2"));
        assert_eq!(header_get(&headers, "missing"), None);
    }

    #[test]
    fn basic_auth_header_uses_empty_user_for_tokens() {
        // base64(":pat") == "OnBhdA=="
        assert_eq!(basic_auth_header("", "pat"), "Basic OnBhdA==");
    }

    #[test]
    fn is_success_covers_2xx_only() {
        let ok = HttpResponse::json(204, &serde_json::json!({}));
        let bad = HttpResponse::json(404, &serde_json::json!({}));
        assert!(ok.is_success());
        assert!(!bad.is_success());
        assert_eq!(ok.header("content-type"), Some("application/json"));
    }

    #[test]
    fn query_param_decodes_values() {
        let url = "https://dev.azure.com/o/p/_apis/wit/workitems?ids=1%2C2&fields=System.Id";
        assert_eq!(query_param(url, "ids").as_deref(), Some("1,2"));
        assert_eq!(query_param(url, "fields").as_deref(), Some("System.Id"));
        assert_eq!(query_param(url, "nope"), None);
    }

    #[tokio::test]
    async fn mock_transport_prefers_exact_url_then_falls_back_to_path() {
        let transport = MockTransport::new();
        let base = "https://example.com/api";
        transport.push_json(HttpMethod::Get, format!("{base}?a=1"), 200, serde_json::json!(1));
        transport.push_json(HttpMethod::Get, base, 200, serde_json::json!(2));

        let req = |url: &str| HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        };

        let exact = transport.send(req(&format!("{base}?a=1"))).await.expect("exact");
        assert_eq!(exact.body, b"1".to_vec());
        let fallback = transport.send(req(&format!("{base}?a=9"))).await.expect("fallback");
        assert_eq!(fallback.body, b"2".to_vec());

        let err = transport
            .send(req(base))
            .await
            .expect_err("queue exhausted");
        assert!(matches!(err, HttpError::NoMockResponse { .. }));
        assert_eq!(transport.requests_to("/api").len(), 3);
    }

    #[test]
    fn reqwest_transport_with_timeout_builds_client() {
        let transport = reqwest_transport::ReqwestTransport::with_timeout(
            std::time::Duration::from_millis(1),
        )
        .expect("reqwest transport should build");
        let _ = transport;
    }
}
