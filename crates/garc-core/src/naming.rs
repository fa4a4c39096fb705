//! Canonical names, keys and labels of the objects a Runner owns.
//!
//! Every child name is a pure function of the Runner name. Anything else attributed to
//! the same Runner is an orphan.

/// Kind recorded in the controller owner reference of every child.
pub const OWNER_KIND: &str = "Runner";

/// Secret key holding the registration token.
pub const TOKEN_KEY: &str = "GITHUB_TOKEN";

/// Credential annotation carrying the token expiry as RFC3339.
pub const EXPIRES_AT_ANNOTATION: &str = "github-actions-runner.kaidotio.github.io/expiresAt";

/// ConfigMap key holding the provisioning script.
pub const DOCKERFILE_KEY: &str = "Dockerfile";

/// Pod template annotation recording the declared base image.
pub const IMAGE_ANNOTATION: &str = "image";

/// Pod template label used for selection and anti-affinity.
pub const APP_LABEL: &str = "app";

/// Name of the credential Secret.
pub fn credential_name(runner: &str) -> String {
    runner.to_string()
}

/// Name of the build-context ConfigMap.
pub fn workspace_name(runner: &str) -> String {
    format!("{runner}-workspace")
}

/// Name of the Deployment, also used as its `app` label value.
pub fn workload_name(runner: &str) -> String {
    format!("{runner}-runner")
}
