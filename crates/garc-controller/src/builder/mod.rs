//! Desired state of the objects a Runner owns.
//!
//! Everything here is pure: a `&Runner` and the [`ControllerConfig`] go in, fully
//! specified child objects come out. Values the controller fills in on the Runner's
//! behalf (the resolved token reference, the default builder memory limit, the image
//! repository id) live in [`EffectiveRunner`]; the Runner itself is never modified.

mod credential;
mod workload;
mod workspace;

use std::collections::BTreeMap;

use garc_core::naming::{self, TOKEN_KEY};
use garc_core::{Runner, repository_id};
use k8s_openapi::api::core::v1::{ResourceRequirements, SecretKeySelector};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::config::ControllerConfig;

pub use credential::build_credential;
pub use workload::{
    BUILDER_CONTAINER, EXPORTER_CONTAINER, METRICS_PORT, RUNNER_CONTAINER, RUNNER_UID,
    WORKSPACE_VOLUME, build_deployment,
};
pub use workspace::{build_workspace, render_dockerfile};

/// Memory limit of the builder container when the Runner sets none.
pub const DEFAULT_BUILDER_MEMORY: &str = "4Gi";

const MEMORY: &str = "memory";

/// A Runner together with the values resolved for it in this pass.
#[derive(Debug, Clone)]
pub struct EffectiveRunner<'a> {
    pub runner: &'a Runner,
    pub name: String,
    pub namespace: String,
    /// Token the runner registers with: the Runner's own reference, or the
    /// controller-managed credential when tokens are issued dynamically.
    pub token_ref: Option<SecretKeySelector>,
    /// Builder resources with the default memory limit applied.
    pub builder_resources: ResourceRequirements,
    /// Repository id of the built image in both registries.
    pub repository_id: String,
}

impl<'a> EffectiveRunner<'a> {
    /// Resolves `runner` in `namespace`/`name`.
    ///
    /// `issues_tokens` is true when the controller manages this Runner's credential.
    pub fn resolve(
        runner: &'a Runner,
        namespace: &str,
        name: &str,
        config: &ControllerConfig,
        issues_tokens: bool,
    ) -> Self {
        let token_ref = runner.spec.token_secret_key_ref.clone().or_else(|| {
            issues_tokens.then(|| SecretKeySelector {
                name: naming::credential_name(name),
                key: TOKEN_KEY.to_string(),
                optional: None,
            })
        });

        Self {
            runner,
            name: name.to_string(),
            namespace: namespace.to_string(),
            token_ref,
            builder_resources: with_default_memory_limit(
                &runner.spec.builder_container_spec.resources,
            ),
            repository_id: repository_id(
                &runner.spec.image,
                &config.versions.binary,
                &config.versions.runner,
            ),
        }
    }

    /// Whether the controller manages the credential for this Runner.
    pub fn issues_tokens(runner: &Runner, config: &ControllerConfig) -> bool {
        runner.spec.token_secret_key_ref.is_none() && config.github_app.is_configured()
    }
}

fn with_default_memory_limit(resources: &ResourceRequirements) -> ResourceRequirements {
    let mut resources = resources.clone();
    let limits = resources.limits.get_or_insert_with(BTreeMap::new);
    if limits.get(MEMORY).is_none_or(is_zero_quantity) {
        limits.insert(
            MEMORY.to_string(),
            Quantity(DEFAULT_BUILDER_MEMORY.to_string()),
        );
    }
    resources
}

/// A quantity is zero when its numeric part is zero, whatever the suffix.
fn is_zero_quantity(quantity: &Quantity) -> bool {
    let value = quantity.0.trim();
    let numeric_end = value
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
        .unwrap_or(value.len());
    value[..numeric_end]
        .parse::<f64>()
        .map(|n| n == 0.0)
        // An empty or malformed limit is replaced by the default like a zero one.
        .unwrap_or(true)
}

/// `None` for an empty list, so stored objects compare equal after a round trip.
pub(crate) fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_token_ref_resolution() {
        let runner = runner("org/repo", "ubuntu:22.04");
        let cfg = app_config();
        assert!(EffectiveRunner::issues_tokens(&runner, &cfg));

        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &cfg, true);
        let token_ref = effective.token_ref.unwrap();
        assert_eq!(token_ref.name, "build");
        assert_eq!(token_ref.key, "GITHUB_TOKEN");
        assert!(runner.spec.token_secret_key_ref.is_none());

        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &config(), false);
        assert!(effective.token_ref.is_none());
    }

    #[test]
    fn test_static_token_ref_wins() {
        let mut runner = runner("org/repo", "ubuntu:22.04");
        runner.spec.token_secret_key_ref = Some(SecretKeySelector {
            name: "static".into(),
            key: "token".into(),
            optional: None,
        });
        assert!(!EffectiveRunner::issues_tokens(&runner, &app_config()));

        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &app_config(), false);
        assert_eq!(effective.token_ref.unwrap().name, "static");
    }

    #[test]
    fn test_repository_id_uses_configured_versions() {
        let runner = runner("org/repo", "ubuntu:22.04");
        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &config(), false);
        assert_eq!(effective.repository_id, "5013086");
    }

    #[test]
    fn test_builder_memory_defaults_to_4gi() {
        let mut runner = runner("org/repo", "ubuntu:22.04");
        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &config(), false);
        let limits = effective.builder_resources.limits.unwrap();
        assert_eq!(limits.get("memory"), Some(&Quantity("4Gi".into())));
        assert!(runner.spec.builder_container_spec.resources.limits.is_none());

        runner.spec.builder_container_spec.resources.limits = Some(BTreeMap::from([
            ("memory".to_string(), Quantity("0".into())),
            ("cpu".to_string(), Quantity("2".into())),
        ]));
        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &config(), false);
        let limits = effective.builder_resources.limits.unwrap();
        assert_eq!(limits.get("memory"), Some(&Quantity("4Gi".into())));
        assert_eq!(limits.get("cpu"), Some(&Quantity("2".into())));
    }

    #[test]
    fn test_builder_memory_override_is_kept() {
        let mut runner = runner("org/repo", "ubuntu:22.04");
        runner.spec.builder_container_spec.resources.limits = Some(BTreeMap::from([(
            "memory".to_string(),
            Quantity("8Gi".into()),
        )]));
        let effective = EffectiveRunner::resolve(&runner, "ci", "build", &config(), false);
        let limits = effective.builder_resources.limits.unwrap();
        assert_eq!(limits.get("memory"), Some(&Quantity("8Gi".into())));
    }

    #[test]
    fn test_zero_quantities() {
        assert!(is_zero_quantity(&Quantity("0".into())));
        assert!(is_zero_quantity(&Quantity("0Gi".into())));
        assert!(is_zero_quantity(&Quantity("0.0Mi".into())));
        assert!(!is_zero_quantity(&Quantity("512Mi".into())));
        assert!(!is_zero_quantity(&Quantity("1e3".into())));
        assert!(is_zero_quantity(&Quantity("".into())));
        assert!(is_zero_quantity(&Quantity("Gi".into())));
    }
}
