//! Request-side interceptor: attaches the bearer token.

use tracing::{debug, warn};

use super::request::ApiRequest;
use crate::auth::{AuthRuntimeState, TokenError};

/// Attaches `Authorization: Bearer <token>` to outgoing requests.
///
/// Never fails the request. Without a token the server answers 401 and the
/// [`RefreshCoordinator`](super::RefreshCoordinator) takes over.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestInterceptor;

impl RequestInterceptor {
    /// Returns whether a token was attached.
    pub async fn apply(&self, state: &AuthRuntimeState, request: &mut ApiRequest) -> bool {
        if !state.is_authenticated() {
            return false;
        }
        let Some(provider) = state.token_provider() else {
            debug!(path = %request.path, "Authenticated but no token provider bound");
            return false;
        };

        match provider.fetch_token(&state.fetch_options()).await {
            Ok(token) => match request.set_bearer(&token) {
                Ok(()) => true,
                Err(e) => {
                    warn!(path = %request.path, error = %e, "Failed to attach access token");
                    false
                }
            },
            Err(TokenError::NoRefreshCredential) => {
                warn!(path = %request.path, "No refresh credential, login required");
                state.notify_login_required();
                false
            }
            Err(e) => {
                warn!(path = %request.path, error = %e, "Failed to get access token");
                false
            }
        }
    }
}
