//! Installation token client.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use time::OffsetDateTime;

use crate::TokenResult;
use crate::error::TokenExchangeError;
use crate::jwt::sign_assertion;
use crate::types::{AccessToken, AccessTokenRequest, AppCredentials};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Source of repository-scoped registration tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issues a token for `repository_name` (the part after `owner/`).
    async fn issue(&self, repository_name: &str) -> TokenResult<AccessToken>;
}

/// Exchanges app credentials for installation access tokens over HTTP.
#[derive(Debug, Clone)]
pub struct AppTokenClient {
    http_client: reqwest::Client,
    credentials: AppCredentials,
}

impl AppTokenClient {
    /// Creates a client for `credentials`.
    ///
    /// # Errors
    ///
    /// Returns `Request` if the HTTP client cannot be built.
    pub fn new(credentials: AppCredentials) -> TokenResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(credentials.request_timeout)
            .user_agent(concat!("garc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TokenExchangeError::Request(e.to_string()))?;

        Ok(Self {
            http_client,
            credentials,
        })
    }

    /// Returns the credentials this client signs with.
    pub fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }
}

#[async_trait]
impl TokenIssuer for AppTokenClient {
    async fn issue(&self, repository_name: &str) -> TokenResult<AccessToken> {
        let assertion = sign_assertion(
            &self.credentials.private_key,
            &self.credentials.client_id,
            OffsetDateTime::now_utc(),
        )?;

        let url = self.credentials.access_tokens_url();
        tracing::debug!(%url, repository = repository_name, "requesting installation token");

        let response = self
            .http_client
            .post(&url)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(AUTHORIZATION, format!("Bearer {assertion}"))
            .header(API_VERSION_HEADER, API_VERSION)
            .json(&AccessTokenRequest::for_repository(repository_name))
            .send()
            .await
            .map_err(|e| TokenExchangeError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %url, "token endpoint rejected request");
            return Err(TokenExchangeError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| TokenExchangeError::Decode(e.to_string()))?;
        tracing::debug!(expires_at = %token.expires_at, "installation token issued");
        Ok(token)
    }
}
