//! Wire transport underneath the interceptor pipeline.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::debug;
use url::Url;

use super::request::{ApiRequest, RequestBody};
use super::response::ApiResponse;
use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// Default user agent for the application.
pub const USER_AGENT: &str = concat!("pawject-client/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends one request and buffers the response.
///
/// Any HTTP status counts as a completed send; only connection-level
/// failures are errors.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] over a `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: Client,
    base_url: Option<Url>,
}

impl ReqwestTransport {
    /// Create a transport with default settings and no base URL.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .request_timeout(Duration::from_secs(config.request_timeout_secs))
            .with_credentials(config.with_credentials);
        if !config.url.is_empty() {
            builder = builder.base_url(&config.url)?;
        }
        builder.build()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve a request path against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(path) {
            return Ok(absolute);
        }
        let base = self.base_url.as_ref().ok_or_else(|| {
            Error::InvalidRequest(format!("relative path '{path}' without a base URL"))
        })?;
        base.join(path.trim_start_matches('/'))
            .map_err(|e| Error::InvalidRequest(format!("invalid path '{path}': {e}")))
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.resolve(&request.path)?;
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = self
            .inner
            .request(request.method.clone(), url)
            .headers(request.effective_headers());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            None => builder,
        };

        let response = builder.send().await.map_err(Error::from_send)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(Error::from_send)?;

        debug!(status = status.as_u16(), bytes = body.len(), "Received response");
        Ok(ApiResponse::new(status, headers, body))
    }
}

/// Builder for [`ReqwestTransport`].
pub struct ReqwestTransportBuilder {
    builder: ClientBuilder,
    base_url: Option<Url>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            builder: Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT),
            base_url: None,
        }
    }
}

impl ReqwestTransportBuilder {
    /// Backend root. A trailing slash is added so relative paths append.
    pub fn base_url(mut self, url: &str) -> Result<Self> {
        let normalized = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };
        let parsed = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("invalid backend URL '{url}': {e}")))?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.builder = self.builder.user_agent(ua);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.connect_timeout(timeout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    /// Keep and send cookies across requests (credentialed requests).
    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.builder = self.builder.cookie_store(enabled);
        self
    }

    /// Fails when the client settings are rejected (e.g. a user agent that
    /// is not a valid header value).
    pub fn build(self) -> Result<ReqwestTransport> {
        let inner = self
            .builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(ReqwestTransport {
            inner,
            base_url: self.base_url,
        })
    }
}
