//! App assertion signing.
//!
//! GitHub authenticates an app by a short-lived RS256 JWT whose issuer is the app's
//! client id. Keys come as PEM, either `RSA PRIVATE KEY` (PKCS#1, what GitHub hands
//! out) or `PRIVATE KEY` (PKCS#8).

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::RsaPrivateKey;
use rsa::pkcs1::der::pem;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::TokenResult;
use crate::error::TokenExchangeError;

/// Lifetime of an assertion.
pub const ASSERTION_LIFETIME: Duration = Duration::minutes(10);

const PKCS1_LABEL: &str = "RSA PRIVATE KEY";
const PKCS8_LABEL: &str = "PRIVATE KEY";

/// Claims of an app assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppAssertionClaims {
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiry (seconds since epoch).
    pub exp: i64,
    /// App client id.
    pub iss: String,
}

impl AppAssertionClaims {
    #[must_use]
    pub fn new(client_id: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            iat: now.unix_timestamp(),
            exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
            iss: client_id.into(),
        }
    }
}

/// Signs an assertion for `client_id` with `private_key_pem`, issued at `now`.
///
/// # Errors
///
/// - `KeyDecode` if the input holds no PEM block.
/// - `KeyParse` if the block is not an RSA private key.
/// - `Signing` if the key cannot be used for RS256.
pub fn sign_assertion(
    private_key_pem: &str,
    client_id: &str,
    now: OffsetDateTime,
) -> TokenResult<String> {
    let key = decode_private_key(private_key_pem)?;
    let der = key
        .to_pkcs1_der()
        .map_err(|e| TokenExchangeError::Signing(e.to_string()))?;
    let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

    let claims = AppAssertionClaims::new(client_id, now);
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| TokenExchangeError::Signing(e.to_string()))
}

/// Decodes the first PEM block of `input` into an RSA private key.
pub fn decode_private_key(input: &str) -> TokenResult<RsaPrivateKey> {
    let block = first_pem_block(input)
        .ok_or_else(|| TokenExchangeError::KeyDecode("no PEM block found".to_string()))?;
    let (label, der) = pem::decode_vec(block.as_bytes())
        .map_err(|e| TokenExchangeError::KeyDecode(e.to_string()))?;

    let parsed = match label {
        PKCS1_LABEL => RsaPrivateKey::from_pkcs1_der(&der).map_err(|e| e.to_string()),
        PKCS8_LABEL => RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| e.to_string()),
        other => Err(format!("unsupported PEM block type {other:?}")),
    };
    parsed.map_err(TokenExchangeError::KeyParse)
}

/// Returns the first `-----BEGIN ...-----` through `-----END ...-----` span.
fn first_pem_block(input: &str) -> Option<&str> {
    let start = input.find("-----BEGIN ")?;
    let end_marker = start + input[start..].find("-----END ")?;
    let tail = end_marker + "-----END ".len();
    let end = tail + input[tail..].find("-----")? + "-----".len();
    Some(&input[start..end])
}
