use crate::auth::TokenError;

/// Errors surfaced to callers of [`HttpClient`](crate::net::HttpClient).
///
/// Authorization failures that were handled by a silent refresh-and-retry
/// never show up here; only terminal outcomes do.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Obtaining a fresh access token failed.
    #[error("Token refresh failed: {0}")]
    Refresh(#[source] TokenError),

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request could not be built (bad URL, header, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether this is an authorization failure (401).
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Whether the user has to sign in again interactively.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Refresh(e) if e.is_no_refresh_credential())
    }

    /// Map a reqwest send error, separating timeouts from other failures.
    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }
}
