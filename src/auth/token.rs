//! Access tokens and the token-provider capability.
//!
//! The client never inspects a token's structure: a [`Token`] is an opaque
//! bearer string whose expiry is the provider's business.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Masked form safe for logs.
    pub fn masked(&self) -> String {
        mask_token(&self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.masked()).finish()
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Keep the first and last four characters of long tokens.
pub(crate) fn mask_token(token: &str) -> String {
    if token.len() <= 12 || !token.is_ascii() {
        return "***".to_string();
    }
    format!("{}***{}", &token[..4], &token[token.len() - 4..])
}

/// Failure to obtain an access token.
///
/// `Clone` because a single refresh outcome is observed by every request
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The session has no usable refresh credential; the user must sign in again.
    #[error("No refresh credential available")]
    NoRefreshCredential,

    /// The provider did not answer within the refresh timeout.
    #[error("Token refresh timed out after {0:?}")]
    Timeout(Duration),

    /// Transient or provider-side failure.
    #[error("{0}")]
    Other(String),
}

impl TokenError {
    pub fn is_no_refresh_credential(&self) -> bool {
        matches!(self, Self::NoRefreshCredential)
    }
}

/// Options passed to [`TokenProvider::fetch_token`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Extra authorization parameters (`audience`, `scope`, ...).
    pub authorization_params: BTreeMap<String, String>,
    /// Skip any cached token and go to the token endpoint.
    pub force_refresh: bool,
}

impl FetchOptions {
    pub fn new(authorization_params: BTreeMap<String, String>) -> Self {
        Self {
            authorization_params,
            force_refresh: false,
        }
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

/// Source of access tokens.
///
/// Implementations return a currently valid token, silently refreshing it
/// when expired (or when `force_refresh` is set).
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, options: &FetchOptions) -> Result<Token, TokenError>;
}

#[async_trait::async_trait]
impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    async fn fetch_token(&self, options: &FetchOptions) -> Result<Token, TokenError> {
        (**self).fetch_token(options).await
    }
}

/// Invoked with `true` when the host should present an interactive sign-in.
pub type LoginRequiredCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Provider that always hands out the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Token,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, _options: &FetchOptions) -> Result<Token, TokenError> {
        Ok(self.token.clone())
    }
}
