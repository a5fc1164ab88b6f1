//! Process-wide authentication runtime state.
//!
//! One [`AuthRuntimeState`] lives for the whole session and is shared (via
//! `Arc`) between the request interceptor and the refresh coordinator. The
//! host updates its bindings in place whenever the session changes.
//!
//! The refresh slot implements single-flight: the first request that needs a
//! new token installs a shared future (leader), every later request joins it
//! (follower) until it settles. The check and the install happen under one
//! lock with no `.await` in between. The refresh runs as its own task, so it
//! settles and frees the slot even if every waiting request is cancelled.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::token::{FetchOptions, LoginRequiredCallback, Token, TokenError, TokenProvider};

/// Upper bound on how long any request waits for a refresh to settle.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh outcome shared by the leader and all followers.
pub type RefreshFuture = Shared<BoxFuture<'static, Result<Token, TokenError>>>;

#[derive(Default)]
struct Bindings {
    provider: Option<Arc<dyn TokenProvider>>,
    authenticated: bool,
    login_required: Option<LoginRequiredCallback>,
    authorization_params: BTreeMap<String, String>,
}

struct RefreshSlot {
    generation: u64,
    future: RefreshFuture,
}

/// Whether a request started the refresh or joined one already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRole {
    Leader,
    Follower,
}

/// Handle on the in-flight refresh returned by
/// [`AuthRuntimeState::begin_or_join_refresh`].
pub struct RefreshTicket {
    role: RefreshRole,
    generation: u64,
    future: RefreshFuture,
}

impl RefreshTicket {
    pub fn role(&self) -> RefreshRole {
        self.role
    }

    /// Refresh cycle this ticket belongs to (starts at 1).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the shared refresh to settle.
    pub async fn wait(self) -> Result<Token, TokenError> {
        self.future.await
    }
}

/// Shared authentication bindings plus single-flight refresh bookkeeping.
pub struct AuthRuntimeState {
    bindings: RwLock<Bindings>,
    refresh: Mutex<Option<RefreshSlot>>,
    cycles: AtomicU64,
    refresh_timeout: Duration,
}

impl AuthRuntimeState {
    /// Empty bindings: unauthenticated, no provider, no callback.
    pub fn new() -> Self {
        Self::with_refresh_timeout(DEFAULT_REFRESH_TIMEOUT)
    }

    pub fn with_refresh_timeout(refresh_timeout: Duration) -> Self {
        Self {
            bindings: RwLock::new(Bindings::default()),
            refresh: Mutex::new(None),
            cycles: AtomicU64::new(0),
            refresh_timeout,
        }
    }

    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    // -- Bindings --------------------------------------------------------

    pub fn set_token_provider(&self, provider: Arc<dyn TokenProvider>) {
        self.bindings.write().provider = Some(provider);
    }

    pub fn clear_token_provider(&self) {
        self.bindings.write().provider = None;
    }

    pub fn token_provider(&self) -> Option<Arc<dyn TokenProvider>> {
        self.bindings.read().provider.clone()
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.bindings.write().authenticated = authenticated;
    }

    pub fn is_authenticated(&self) -> bool {
        self.bindings.read().authenticated
    }

    /// Replace provider and authentication status together, e.g. when the
    /// session object itself changes.
    pub fn bind_session(&self, provider: Option<Arc<dyn TokenProvider>>, authenticated: bool) {
        let mut bindings = self.bindings.write();
        bindings.provider = provider;
        bindings.authenticated = authenticated;
    }

    pub fn set_login_required_callback(&self, callback: LoginRequiredCallback) {
        self.bindings.write().login_required = Some(callback);
    }

    pub fn clear_login_required_callback(&self) {
        self.bindings.write().login_required = None;
    }

    pub fn set_authorization_params(&self, params: BTreeMap<String, String>) {
        self.bindings.write().authorization_params = params;
    }

    /// Options for a regular (possibly cached) token fetch.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new(self.bindings.read().authorization_params.clone())
    }

    /// Ask the host to show its sign-in prompt. No-op when nothing is bound.
    pub fn notify_login_required(&self) {
        // Clone out so the callback runs without the bindings lock held.
        let callback = self.bindings.read().login_required.clone();
        match callback {
            Some(callback) => callback(true),
            None => debug!("Login required but no callback bound"),
        }
    }

    // -- Single-flight refresh -------------------------------------------

    pub fn is_refresh_in_flight(&self) -> bool {
        self.refresh.lock().is_some()
    }

    /// Number of refresh cycles started so far.
    pub fn refresh_cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Join the in-flight refresh, or start one if none is running.
    ///
    /// Returns `None` only when no refresh is running and no provider is
    /// bound to start one.
    ///
    /// Must be called from within a Tokio runtime; the leader spawns the
    /// refresh task.
    pub fn begin_or_join_refresh(self: &Arc<Self>) -> Option<RefreshTicket> {
        let mut slot = self.refresh.lock();

        if let Some(existing) = slot.as_ref() {
            debug!(generation = existing.generation, "Joining in-flight token refresh");
            return Some(RefreshTicket {
                role: RefreshRole::Follower,
                generation: existing.generation,
                future: existing.future.clone(),
            });
        }

        let provider = self.token_provider()?;
        let generation = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let task = tokio::spawn(self.refresh_future(provider, generation));
        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(TokenError::Other(format!("token refresh task failed: {e}"))))
        }
        .boxed()
        .shared();
        *slot = Some(RefreshSlot {
            generation,
            future: future.clone(),
        });

        info!(generation, "Starting token refresh");
        Some(RefreshTicket {
            role: RefreshRole::Leader,
            generation,
            future,
        })
    }

    /// The refresh task. Cleanup runs inside it, so it happens exactly once
    /// and before any waiter observes the outcome.
    fn refresh_future(
        self: &Arc<Self>,
        provider: Arc<dyn TokenProvider>,
        generation: u64,
    ) -> BoxFuture<'static, Result<Token, TokenError>> {
        let state: Weak<Self> = Arc::downgrade(self);
        let options = self.fetch_options().force_refresh();
        let timeout = self.refresh_timeout;

        async move {
            let attempt = AssertUnwindSafe(provider.fetch_token(&options)).catch_unwind();
            let result = match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TokenError::Other("token provider panicked".into())),
                Err(_) => Err(TokenError::Timeout(timeout)),
            };

            if let Some(state) = state.upgrade() {
                state.finish_refresh(generation, &result);
            }
            result
        }
        .boxed()
    }

    fn finish_refresh(&self, generation: u64, result: &Result<Token, TokenError>) {
        {
            let mut slot = self.refresh.lock();
            if slot.as_ref().is_some_and(|s| s.generation == generation) {
                *slot = None;
            }
        }

        match result {
            Ok(token) => info!(generation, token = %token.masked(), "Token refreshed"),
            Err(TokenError::NoRefreshCredential) => {
                warn!(generation, "Token refresh failed: no refresh credential, login required");
                self.notify_login_required();
            }
            Err(e) => warn!(generation, error = %e, "Token refresh failed"),
        }
    }
}

impl Default for AuthRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthRuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never take the refresh slot while holding the bindings lock.
        let refresh_in_flight = self.is_refresh_in_flight();
        let bindings = self.bindings.read();
        f.debug_struct("AuthRuntimeState")
            .field("authenticated", &bindings.authenticated)
            .field("has_provider", &bindings.provider.is_some())
            .field("has_login_callback", &bindings.login_required.is_some())
            .field("refresh_in_flight", &refresh_in_flight)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish()
    }
}
