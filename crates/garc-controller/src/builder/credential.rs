use std::collections::BTreeMap;

use garc_auth::AccessToken;
use garc_core::naming::{self, EXPIRES_AT_ANNOTATION, TOKEN_KEY};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::EffectiveRunner;

/// Builds the credential Secret carrying `token` and its expiry.
pub fn build_credential(effective: &EffectiveRunner<'_>, token: &AccessToken) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(naming::credential_name(&effective.name)),
            namespace: Some(effective.namespace.clone()),
            annotations: Some(BTreeMap::from([(
                EXPIRES_AT_ANNOTATION.to_string(),
                token.expires_at.clone(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            TOKEN_KEY.to_string(),
            ByteString(token.token.clone().into_bytes()),
        )])),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::test_support::*;

    #[test]
    fn test_credential_secret() {
        let runner = runner("org/repo", "ubuntu:22.04");
        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &app_config(), true);
        let token = AccessToken {
            token: "ghs_abc".into(),
            expires_at: "2030-01-01T01:00:00Z".into(),
        };

        let secret = build_credential(&effective, &token);
        assert_eq!(secret.metadata.name.as_deref(), Some("build"));
        assert_eq!(
            secret.metadata.annotations.unwrap()[EXPIRES_AT_ANNOTATION],
            "2030-01-01T01:00:00Z"
        );
        assert_eq!(secret.data.unwrap()["GITHUB_TOKEN"].0, b"ghs_abc".to_vec());
        assert!(secret.string_data.is_none());
    }
}
