use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{RefreshTokenProvider, StaticTokenProvider, TokenInfo, TokenProvider};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "backend.url") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL every request path is joined onto.
    #[serde(default)]
    pub url: String,
    /// Keep and send cookies with every request.
    #[serde(default = "default_true")]
    pub with_credentials: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            with_credentials: true,
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// How long requests wait for a token refresh before failing.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// OAuth token endpoint used for the refresh-token grant.
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Fixed access token, used when no refresh flow is configured.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_timeout_secs: default_refresh_timeout_secs(),
            audience: None,
            scope: None,
            token_url: None,
            client_id: None,
            refresh_token: None,
            access_token: None,
        }
    }
}

impl AuthConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    crate::net::transport::USER_AGENT.to_string()
}
const fn default_connect_timeout_secs() -> u64 {
    10
}
const fn default_request_timeout_secs() -> u64 {
    60
}
const fn default_refresh_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loading, env overrides, and derived values
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `PAWJECT_` takes precedence over
    /// the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save the file-level configuration to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        // -- Backend --
        env_str!("backend.url", "PAWJECT_BACKEND_URL", self.backend.url);
        env_bool!(
            "backend.with_credentials",
            "PAWJECT_BACKEND_WITH_CREDENTIALS",
            self.backend.with_credentials
        );
        env_str!("backend.user_agent", "PAWJECT_BACKEND_USER_AGENT", self.backend.user_agent);
        env_parse!(
            "backend.connect_timeout_secs",
            "PAWJECT_BACKEND_CONNECT_TIMEOUT_SECS",
            self.backend.connect_timeout_secs
        );
        env_parse!(
            "backend.request_timeout_secs",
            "PAWJECT_BACKEND_REQUEST_TIMEOUT_SECS",
            self.backend.request_timeout_secs
        );

        // -- Auth --
        env_parse!(
            "auth.refresh_timeout_secs",
            "PAWJECT_AUTH_REFRESH_TIMEOUT_SECS",
            self.auth.refresh_timeout_secs
        );
        env_opt_str!("auth.audience", "PAWJECT_AUTH_AUDIENCE", self.auth.audience);
        env_opt_str!("auth.scope", "PAWJECT_AUTH_SCOPE", self.auth.scope);
        env_opt_str!("auth.token_url", "PAWJECT_AUTH_TOKEN_URL", self.auth.token_url);
        env_opt_str!("auth.client_id", "PAWJECT_AUTH_CLIENT_ID", self.auth.client_id);
        env_opt_str!("auth.refresh_token", "PAWJECT_AUTH_REFRESH_TOKEN", self.auth.refresh_token);
        env_opt_str!("auth.access_token", "PAWJECT_AUTH_ACCESS_TOKEN", self.auth.access_token);

        // -- Logging --
        env_str!("logging.level", "PAWJECT_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "PAWJECT_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }

    /// Authorization parameters sent with every token fetch.
    pub fn authorization_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let Some(audience) = &self.auth.audience {
            params.insert("audience".to_string(), audience.clone());
        }
        if let Some(scope) = &self.auth.scope {
            params.insert("scope".to_string(), scope.clone());
        }
        params
    }

    /// Token provider implied by the `[auth]` section, if any.
    ///
    /// A token endpoint plus refresh token selects the refresh-token grant;
    /// a bare access token selects a static provider; nothing means the
    /// session is unauthenticated.
    pub fn token_provider(&self) -> Result<Option<Arc<dyn TokenProvider>>> {
        let auth = &self.auth;
        match (&auth.token_url, &auth.refresh_token) {
            (Some(token_url), Some(refresh_token)) => {
                let client_id = auth.client_id.clone().ok_or_else(|| {
                    Error::Config("auth.client_id is required with auth.token_url".into())
                })?;
                let info = match &auth.access_token {
                    Some(access) => TokenInfo::new(access.clone(), Some(refresh_token.clone()), None),
                    None => TokenInfo::from_refresh_token(refresh_token.clone()),
                };
                Ok(Some(Arc::new(RefreshTokenProvider::new(
                    token_url.clone(),
                    client_id,
                    info,
                ))))
            }
            (None, Some(_)) => Err(Error::Config(
                "auth.refresh_token requires auth.token_url".into(),
            )),
            _ => Ok(auth
                .access_token
                .clone()
                .map(|t| Arc::new(StaticTokenProvider::new(t)) as Arc<dyn TokenProvider>)),
        }
    }
}
