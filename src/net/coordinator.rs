//! Response-side refresh coordinator.
//!
//! On a 401 for a request that has not been retried yet, the request joins
//! (or starts) the single in-flight token refresh, then is replayed once
//! with the new token. The replay's outcome is final.

use std::sync::Arc;

use tracing::{debug, warn};

use super::client::dispatch;
use super::request::ApiRequest;
use super::response::ApiResponse;
use super::transport::Transport;
use crate::auth::{AuthRuntimeState, RefreshRole};
use crate::error::{Error, Result};

/// What to do with a completed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not an authorization failure; hand the outcome to the caller.
    Pass,
    /// Authorization failure on an already retried request.
    NotRetryable,
    /// Authorization failure eligible for refresh-and-retry.
    NeedsRefresh,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshCoordinator;

impl RefreshCoordinator {
    pub fn classify(
        &self,
        state: &AuthRuntimeState,
        request: &ApiRequest,
        outcome: &Result<ApiResponse>,
    ) -> Disposition {
        let unauthorized = matches!(outcome, Err(e) if e.is_unauthorized());
        if !unauthorized || !state.is_authenticated() {
            Disposition::Pass
        } else if request.is_retried() {
            Disposition::NotRetryable
        } else {
            Disposition::NeedsRefresh
        }
    }

    /// Turn a send outcome into the final result for the caller.
    pub async fn resolve(
        &self,
        state: &Arc<AuthRuntimeState>,
        transport: &dyn Transport,
        mut request: ApiRequest,
        outcome: Result<ApiResponse>,
    ) -> Result<ApiResponse> {
        match self.classify(state, &request, &outcome) {
            Disposition::Pass => return outcome,
            Disposition::NotRetryable => {
                debug!(path = %request.path, "Authorization failed after retry, giving up");
                return outcome;
            }
            Disposition::NeedsRefresh => {}
        }

        request.mark_retried();

        // No `.await` between the in-flight check and installing the refresh.
        let Some(ticket) = state.begin_or_join_refresh() else {
            debug!(path = %request.path, "No token provider bound, cannot refresh");
            return outcome;
        };
        let role = ticket.role();
        debug!(path = %request.path, ?role, generation = ticket.generation(), "Awaiting token refresh");

        let token = ticket.wait().await.map_err(|e| {
            if role == RefreshRole::Leader {
                warn!(path = %request.path, error = %e, "Refresh failed, request not retried");
            }
            Error::Refresh(e)
        })?;

        request.set_bearer(&token)?;
        debug!(path = %request.path, "Replaying request with refreshed token");
        dispatch(transport, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;

    fn unauthorized() -> Result<ApiResponse> {
        Err(Error::Status {
            status: 401,
            message: "Unauthorized".into(),
        })
    }

    fn authenticated_state() -> AuthRuntimeState {
        let state = AuthRuntimeState::new();
        state.bind_session(Some(Arc::new(StaticTokenProvider::new("t"))), true);
        state
    }

    #[test]
    fn test_classify_success_passes() {
        let state = authenticated_state();
        let ok = Ok(ApiResponse::new(StatusCode::OK, HeaderMap::new(), "{}"));
        assert_eq!(
            RefreshCoordinator.classify(&state, &ApiRequest::get("a"), &ok),
            Disposition::Pass
        );
    }

    #[test]
    fn test_classify_other_errors_pass() {
        let state = authenticated_state();
        let request = ApiRequest::get("a");
        for outcome in [
            Err(Error::Status {
                status: 500,
                message: "boom".into(),
            }),
            Err(Error::Status {
                status: 403,
                message: "forbidden".into(),
            }),
            Err(Error::Timeout),
        ] {
            assert_eq!(
                RefreshCoordinator.classify(&state, &request, &outcome),
                Disposition::Pass
            );
        }
    }

    #[test]
    fn test_classify_first_401_needs_refresh() {
        let state = authenticated_state();
        assert_eq!(
            RefreshCoordinator.classify(&state, &ApiRequest::get("a"), &unauthorized()),
            Disposition::NeedsRefresh
        );
    }

    #[test]
    fn test_classify_retried_401_not_retryable() {
        let state = authenticated_state();
        let mut request = ApiRequest::get("a");
        request.mark_retried();
        assert_eq!(
            RefreshCoordinator.classify(&state, &request, &unauthorized()),
            Disposition::NotRetryable
        );
    }

    #[test]
    fn test_classify_unauthenticated_passes() {
        let state = authenticated_state();
        state.set_authenticated(false);
        assert_eq!(
            RefreshCoordinator.classify(&state, &ApiRequest::get("a"), &unauthorized()),
            Disposition::Pass
        );
    }
}
