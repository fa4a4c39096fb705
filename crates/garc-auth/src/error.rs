/// Errors that can occur while exchanging an app identity for an access token.
#[derive(Debug, thiserror::Error)]
pub enum TokenExchangeError {
    /// The private key contains no PEM block.
    #[error("Failed to decode private key: {0}")]
    KeyDecode(String),

    /// The PEM block does not hold a usable RSA private key.
    #[error("Failed to parse private key: {0}")]
    KeyParse(String),

    /// The assertion could not be signed.
    #[error("Failed to sign assertion: {0}")]
    Signing(String),

    /// The token endpoint could not be reached.
    #[error("Token request failed: {0}")]
    Request(String),

    /// The token endpoint answered with something other than `201 Created`.
    #[error("Failed to get access token: status {status}")]
    UnexpectedStatus {
        /// HTTP status code received.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body is not an access token.
    #[error("Failed to decode access token: {0}")]
    Decode(String),
}

impl TokenExchangeError {
    /// Returns `true` if the configured private key is at fault.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(self, Self::KeyDecode(_) | Self::KeyParse(_) | Self::Signing(_))
    }

    /// Returns the HTTP status for `UnexpectedStatus`.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TokenExchangeError::KeyDecode("x".into()).is_key_error());
        assert!(TokenExchangeError::Signing("x".into()).is_key_error());
        assert!(!TokenExchangeError::Request("x".into()).is_key_error());

        let err = TokenExchangeError::UnexpectedStatus {
            status: 403,
            body: "forbidden".into(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.to_string(), "Failed to get access token: status 403");
    }
}
