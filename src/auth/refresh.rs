//! OAuth 2.0 refresh-token grant provider.
//!
//! Works against any standards-compliant token endpoint: the cached access
//! token is handed out while fresh, otherwise a `grant_type=refresh_token`
//! request is made. A missing refresh token or an `invalid_grant` answer
//! means the session cannot be renewed silently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::token::{FetchOptions, Token, TokenError, TokenProvider, mask_token};

/// Safety margin for token expiry checks (60 seconds).
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// Proactive refresh buffer (5 minutes).
const REFRESH_BUFFER_SECS: i64 = 300;

/// Cached OAuth credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp when the access token expires, if known.
    pub expires_at: Option<i64>,
}

impl TokenInfo {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: Option<i64>) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: expires_in.map(|ei| chrono::Utc::now().timestamp() + ei),
        }
    }

    /// Credentials holding only a refresh token; the first fetch will refresh.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: Some(refresh_token.into()),
            expires_at: None,
        }
    }

    /// Expired or expiring within the safety margin. No expiry means never.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => exp <= chrono::Utc::now().timestamp() + EXPIRY_SAFETY_MARGIN_SECS,
            None => false,
        }
    }

    /// Expiring within the proactive refresh window.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(exp) => exp <= chrono::Utc::now().timestamp() + REFRESH_BUFFER_SECS,
            None => false,
        }
    }

    fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && !self.needs_refresh()
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`TokenProvider`] backed by a refresh token and an OAuth token endpoint.
pub struct RefreshTokenProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    token: Mutex<Option<TokenInfo>>,
}

impl RefreshTokenProvider {
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>, token: TokenInfo) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            token: Mutex::new(Some(token)),
        }
    }

    /// Set the HTTP client (useful for testing or custom TLS config).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Snapshot of the cached credentials.
    pub async fn token_info(&self) -> Option<TokenInfo> {
        self.token.lock().await.clone()
    }

    #[instrument(skip(self, refresh_token, params), fields(token_url = %self.token_url))]
    async fn request_refresh(
        &self,
        refresh_token: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<RefreshResponse, TokenError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        form.extend(
            params
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "grant_type" | "client_id" | "refresh_token"))
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenError::Other(format!("Token endpoint request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error_body(status.as_u16(), &body));
        }

        let data: RefreshResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Other(format!("Failed to parse token response: {e}")))?;

        if data.access_token.is_empty() {
            return Err(TokenError::Other(
                "Token response does not contain access_token".into(),
            ));
        }
        Ok(data)
    }
}

/// `invalid_grant` means the refresh token is dead; anything else is retryable.
fn classify_error_body(status: u16, body: &str) -> TokenError {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(err) if err.error == "invalid_grant" => {
            warn!(
                status,
                description = err.error_description.as_deref().unwrap_or(""),
                "Refresh token rejected"
            );
            TokenError::NoRefreshCredential
        }
        Ok(err) => TokenError::Other(format!(
            "Token endpoint returned {status}: {}",
            err.error_description.unwrap_or(err.error)
        )),
        Err(_) => TokenError::Other(format!("Token endpoint returned {status}: {body}")),
    }
}

#[async_trait::async_trait]
impl TokenProvider for RefreshTokenProvider {
    async fn fetch_token(&self, options: &FetchOptions) -> Result<Token, TokenError> {
        // Holding the lock across the request serialises concurrent refreshes.
        let mut guard = self.token.lock().await;
        let current = guard.as_ref().ok_or(TokenError::NoRefreshCredential)?;

        if !options.force_refresh && current.is_usable() {
            return Ok(Token::new(current.access_token.clone()));
        }

        let refresh_token = match current.refresh_token.as_deref() {
            Some(rt) if !rt.is_empty() => rt.to_string(),
            _ => {
                warn!("Missing refresh token");
                return Err(TokenError::NoRefreshCredential);
            }
        };

        debug!(refresh_token = %mask_token(&refresh_token), "Refreshing access token");
        let response = match self
            .request_refresh(&refresh_token, &options.authorization_params)
            .await
        {
            Ok(response) => response,
            Err(TokenError::NoRefreshCredential) => {
                // Drop the dead refresh token so later fetches fail fast.
                if let Some(info) = guard.as_mut() {
                    info.refresh_token = None;
                }
                return Err(TokenError::NoRefreshCredential);
            }
            Err(e) => return Err(e),
        };

        let mut updated = TokenInfo::new(
            response.access_token,
            Some(refresh_token),
            response.expires_in,
        );
        if let Some(rotated) = response.refresh_token.filter(|rt| !rt.is_empty()) {
            updated.refresh_token = Some(rotated);
        }

        info!("Access token refreshed");
        let token = Token::new(updated.access_token.clone());
        *guard = Some(updated);
        Ok(token)
    }
}

impl std::fmt::Debug for RefreshTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenProvider")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}
