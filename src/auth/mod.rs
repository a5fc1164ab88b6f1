//! Access tokens, token providers, and the shared authentication state.

pub mod refresh;
pub mod state;
pub mod token;

pub use refresh::{RefreshTokenProvider, TokenInfo};
pub use state::{AuthRuntimeState, DEFAULT_REFRESH_TIMEOUT, RefreshRole, RefreshTicket};
pub use token::{
    FetchOptions, LoginRequiredCallback, StaticTokenProvider, Token, TokenError, TokenProvider,
};
