//! Request, response and configuration types for the token endpoint.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Public GitHub REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Identity of a GitHub App installation.
#[derive(Clone)]
pub struct AppCredentials {
    /// App client id, used as the assertion issuer.
    pub client_id: String,

    /// Installation the token is requested for.
    pub installation_id: String,

    /// PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    pub private_key: String,

    /// REST API root (default: `https://api.github.com`).
    pub api_url: String,

    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,
}

impl AppCredentials {
    /// Creates credentials against the public API with default timeouts.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        installation_id: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            installation_id: installation_id.into(),
            private_key: private_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the REST API root.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Endpoint issuing installation tokens.
    pub(crate) fn access_tokens_url(&self) -> String {
        format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url.trim_end_matches('/'),
            self.installation_id
        )
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"[redacted]")
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Body of the token request: one repository, fixed permissions.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccessTokenRequest {
    pub repositories: Vec<String>,
    pub permissions: TokenPermissions,
}

impl AccessTokenRequest {
    /// Scopes a request to a single repository name (no owner segment).
    #[must_use]
    pub fn for_repository(name: impl Into<String>) -> Self {
        Self {
            repositories: vec![name.into()],
            permissions: TokenPermissions::default(),
        }
    }
}

/// Permissions requested for a runner registration token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenPermissions {
    pub actions: String,
    pub administration: String,
    pub metadata: String,
}

impl Default for TokenPermissions {
    fn default() -> Self {
        Self {
            actions: "read".to_string(),
            administration: "write".to_string(),
            metadata: "read".to_string(),
        }
    }
}

/// An installation access token.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,

    /// Expiry as returned by the API, RFC3339.
    pub expires_at: String,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
