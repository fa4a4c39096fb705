//! # garc-auth
//!
//! Exchanges a GitHub App identity for a short-lived installation access token.
//!
//! The flow has two steps:
//!
//! 1. [`sign_assertion`] signs an RS256 JWT (`iss` = app client id, valid for ten
//!    minutes) with the app's PEM-encoded private key.
//! 2. [`AppTokenClient::issue`] presents the JWT to
//!    `POST /app/installations/{id}/access_tokens`, scoped to a single repository.
//!
//! No retries happen here; callers re-run the whole exchange on failure.
//!
//! ## Example
//!
//! ```ignore
//! use garc_auth::{AppCredentials, AppTokenClient, TokenIssuer};
//!
//! let client = AppTokenClient::new(AppCredentials::new("Iv1.abc", "42", pem))?;
//! let token = client.issue("org/repo").await?;
//! println!("expires at {}", token.expires_at);
//! ```

mod client;
mod error;
pub mod jwt;
mod types;

pub use client::{AppTokenClient, TokenIssuer};
pub use error::TokenExchangeError;
pub use jwt::{AppAssertionClaims, sign_assertion};
pub use types::{
    AccessToken, AccessTokenRequest, AppCredentials, DEFAULT_API_URL, TokenPermissions,
};

/// Type alias for token exchange results.
pub type TokenResult<T> = Result<T, TokenExchangeError>;
