//! Shared authenticated HTTP client.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info_span};

use super::coordinator::RefreshCoordinator;
use super::interceptor::RequestInterceptor;
use super::request::{ApiRequest, ResponseType};
use super::response::ApiResponse;
use super::transport::{ReqwestTransport, Transport};
use crate::auth::AuthRuntimeState;
use crate::config::Config;
use crate::error::{Error, Result};

/// Longest error body kept in [`Error::Status`] messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Send through the transport and turn non-2xx statuses into errors.
pub(crate) async fn dispatch(transport: &dyn Transport, request: &ApiRequest) -> Result<ApiResponse> {
    let response = transport.send(request).await?;
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status.as_u16();
    let mut message: String = response.text().chars().take(MAX_ERROR_BODY_CHARS).collect();
    if message.trim().is_empty() {
        message = response
            .status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string();
    }
    Err(Error::Status { status, message })
}

/// A downloaded file.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub bytes: Bytes,
}

struct Inner {
    transport: Arc<dyn Transport>,
    state: Arc<AuthRuntimeState>,
    interceptor: RequestInterceptor,
    coordinator: RefreshCoordinator,
}

/// The one client every API call goes through.
///
/// Cheap to clone; all clones share the transport, the auth state, and the
/// interceptor chain, which is fixed at construction.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, state: Arc<AuthRuntimeState>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                state,
                interceptor: RequestInterceptor,
                coordinator: RefreshCoordinator,
            }),
        }
    }

    /// Build the transport and auth state from configuration.
    ///
    /// The session starts authenticated when the config yields a token
    /// provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::from_config(&config.backend)?;
        let state = AuthRuntimeState::with_refresh_timeout(config.auth.refresh_timeout());
        state.set_authorization_params(config.authorization_params());

        let provider = config.token_provider()?;
        let authenticated = provider.is_some();
        state.bind_session(provider, authenticated);

        Ok(Self::new(Arc::new(transport), Arc::new(state)))
    }

    /// Shared auth state, for updating bindings as the session changes.
    pub fn state(&self) -> &Arc<AuthRuntimeState> {
        &self.inner.state
    }

    /// Run a request through the full pipeline.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let span = info_span!("api_request", method = %request.method, path = %request.path);
        async move {
            let inner = &self.inner;
            let authorized = inner.interceptor.apply(&inner.state, &mut request).await;
            debug!(authorized, "Request intercepted");

            let outcome = dispatch(inner.transport.as_ref(), &request).await;
            inner
                .coordinator
                .resolve(&inner.state, inner.transport.as_ref(), request, outcome)
                .await
        }
        .instrument(span)
        .await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).await?.json()
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.execute(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.execute(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Fetch a binary payload and its `Content-Disposition` filename.
    pub async fn download(&self, request: ApiRequest) -> Result<Download> {
        let response = self
            .execute(request.response_type(ResponseType::Blob))
            .await?;
        Ok(Download {
            filename: response.filename(),
            bytes: response.body,
        })
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("state", &self.inner.state)
            .finish()
    }
}
