//! The `Runner` custom resource.
//!
//! A Runner declares one self-hosted job runner for a repository: the base image the
//! runner image is built from, optional overrides for the builder and runner containers,
//! and pod template fragments layered onto the generated workload.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EnvFromSource, EnvVar, ResourceRequirements, SecretEnvSource, SecretKeySelector, Volume,
    VolumeMount,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a Runner.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "github-actions-runner.kaidotio.github.io",
    version = "v1",
    kind = "Runner",
    namespaced,
    shortname = "rn",
    printcolumn = r#"{"name":"Repository","type":"string","jsonPath":".spec.repository"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSpec {
    /// Base image the runner image is built from, e.g. `ubuntu:22.04`.
    pub image: String,

    /// Repository in `owner/name` form.
    pub repository: String,

    /// Overrides for the image build init container.
    #[serde(default)]
    pub builder_container_spec: ContainerOverrides,

    /// Overrides for the runner container.
    #[serde(default)]
    pub runner_container_spec: ContainerOverrides,

    /// Pre-existing secret key holding a registration token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret_key_ref: Option<SecretKeySelector>,

    /// Secret exposing `github_app_id`, `github_app_installation_id` and
    /// `github_app_private_key` to the runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret_ref: Option<SecretEnvSource>,

    /// Pod template fragments merged into the generated workload.
    #[serde(default)]
    pub template: PodTemplateOverrides,
}

/// User-provided container settings appended to the generated ones.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverrides {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Pod template fragments a Runner may declare.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateOverrides {
    #[serde(default)]
    pub metadata: TemplateMetadata,

    #[serde(default)]
    pub spec: TemplatePodSpec,
}

/// Labels and annotations layered on top of the generated pod metadata.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Extra pod-level volumes, appended after the generated workspace volume.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePodSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl RunnerSpec {
    /// Creates a spec with only the required fields set.
    #[must_use]
    pub fn new(repository: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Repository name with the owner segment stripped (`org/repo` -> `repo`).
    #[must_use]
    pub fn repository_name(&self) -> &str {
        match self.repository.split_once('/') {
            Some((_, name)) => name,
            None => &self.repository,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, Resource};

    #[test]
    fn test_repository_name_strips_owner() {
        let spec = RunnerSpec::new("kaidotio/hippocampus", "ubuntu:22.04");
        assert_eq!(spec.repository_name(), "hippocampus");

        let spec = RunnerSpec::new("standalone", "ubuntu:22.04");
        assert_eq!(spec.repository_name(), "standalone");

        let spec = RunnerSpec::new("org/nested/repo", "ubuntu:22.04");
        assert_eq!(spec.repository_name(), "nested/repo");
    }

    #[test]
    fn test_runner_deserializes_minimal_manifest() {
        let manifest = r#"
apiVersion: github-actions-runner.kaidotio.github.io/v1
kind: Runner
metadata:
  name: example
  namespace: ci
spec:
  image: ubuntu:22.04
  repository: org/repo
  template:
    metadata:
      labels:
        team: platform
"#;
        let runner: Runner = serde_yaml::from_str(manifest).unwrap();
        assert_eq!(runner.metadata.name.as_deref(), Some("example"));
        assert_eq!(runner.spec.image, "ubuntu:22.04");
        assert!(runner.spec.token_secret_key_ref.is_none());
        assert!(runner.spec.builder_container_spec.env.is_empty());
        assert_eq!(
            runner.spec.template.metadata.labels.get("team").map(String::as_str),
            Some("platform")
        );
    }

    #[test]
    fn test_crd_identity() {
        let crd = Runner::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("runners.github-actions-runner.kaidotio.github.io")
        );
        assert_eq!(Runner::kind(&()), "Runner");
    }
}
