//! Token expiry handling and the in-memory token cache.

use std::collections::HashMap;

use garc_auth::AccessToken;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::error::{ReconcileError, Result};

/// Parses an RFC3339 expiry as written on the credential.
pub fn parse_expiry(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|source| ReconcileError::ExpiryParse {
        value: value.to_string(),
        source,
    })
}

/// Delay until a token expiring at `expires_at` must be renewed.
///
/// Negative once the renewal point has passed.
pub fn renewal_delay(expires_at: OffsetDateTime, now: OffsetDateTime, margin: Duration) -> Duration {
    expires_at - now - margin
}

/// Last token issued per Runner.
///
/// A cached token is reused only while it is outside the renewal margin, so drift
/// checks on an existing credential do not cost a token request each pass.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: HashMap<(String, String), CachedToken>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: AccessToken,
    expires_at: OffsetDateTime,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token for `namespace`/`name` if it is not due for renewal.
    pub fn fresh(
        &self,
        namespace: &str,
        name: &str,
        now: OffsetDateTime,
        margin: Duration,
    ) -> Option<&AccessToken> {
        self.entries
            .get(&(namespace.to_string(), name.to_string()))
            .filter(|cached| renewal_delay(cached.expires_at, now, margin).is_positive())
            .map(|cached| &cached.token)
    }

    pub fn insert(&mut self, namespace: &str, name: &str, token: AccessToken, expires_at: OffsetDateTime) {
        self.entries.insert(
            (namespace.to_string(), name.to_string()),
            CachedToken { token, expires_at },
        );
    }

    pub fn remove(&mut self, namespace: &str, name: &str) {
        self.entries.remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: &str) -> AccessToken {
        AccessToken {
            token: value.to_string(),
            expires_at: String::new(),
        }
    }

    #[test]
    fn test_renewal_delay() {
        let now = OffsetDateTime::now_utc();
        let margin = Duration::minutes(1);
        assert_eq!(
            renewal_delay(now + Duration::minutes(5), now, margin),
            Duration::minutes(4)
        );
        assert_eq!(
            renewal_delay(now + Duration::hours(1), now, margin),
            Duration::minutes(59)
        );
        let overdue = renewal_delay(now + Duration::seconds(30), now, margin);
        assert!(overdue.is_negative());
        assert_eq!(overdue, Duration::seconds(-30));
    }

    #[test]
    fn test_parse_expiry() {
        let parsed = parse_expiry("2030-01-01T01:00:00Z").unwrap();
        assert_eq!(parsed.unix_timestamp(), 1_893_459_600);

        let err = parse_expiry("tomorrow").unwrap_err();
        assert!(matches!(err, ReconcileError::ExpiryParse { ref value, .. } if value == "tomorrow"));
    }

    #[test]
    fn test_cache_expires_at_renewal_point() {
        let now = OffsetDateTime::now_utc();
        let margin = Duration::minutes(1);
        let mut cache = TokenCache::new();
        cache.insert("ci", "build", token("a"), now + Duration::minutes(10));

        assert_eq!(cache.fresh("ci", "build", now, margin).map(|t| t.token.as_str()), Some("a"));
        assert!(cache.fresh("ci", "other", now, margin).is_none());
        assert!(cache.fresh("ci", "build", now + Duration::minutes(9), margin).is_none());

        cache.remove("ci", "build");
        assert!(cache.is_empty());
    }
}
