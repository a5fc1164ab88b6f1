//! # pawject-client
//!
//! Authenticated HTTP client for the Pawject shelter backend.
//!
//! Every request goes through one shared [`HttpClient`]: the bearer token is
//! attached up front, and a 401 triggers a single-flight token refresh after
//! which each failed request is replayed exactly once.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pawject_client::{AuthRuntimeState, HttpClient, ReqwestTransport, StaticTokenProvider};
//!
//! # async fn run() -> pawject_client::Result<()> {
//! let transport = ReqwestTransport::builder()
//!     .base_url("https://shelter.example/api/")?
//!     .build()?;
//! let state = Arc::new(AuthRuntimeState::new());
//! state.bind_session(Some(Arc::new(StaticTokenProvider::new("access-token"))), true);
//!
//! let client = HttpClient::new(Arc::new(transport), state);
//! let animals: serde_json::Value = client.get_json("animals").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod net;

pub use auth::{
    AuthRuntimeState, FetchOptions, LoginRequiredCallback, RefreshTokenProvider,
    StaticTokenProvider, Token, TokenError, TokenInfo, TokenProvider,
};
pub use config::Config;
pub use error::{Error, Result};
pub use net::{
    ApiRequest, ApiResponse, Download, HttpClient, RequestBody, ReqwestTransport, ResponseType,
    Transport,
};
