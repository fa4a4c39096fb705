//! Image reference normalization.
//!
//! The runner image is pushed to and pulled from a private registry under a short
//! repository id. The id is derived from the normalized base image name (registry and
//! path, no tag or digest) plus the controller and runner versions, so upgrading either
//! version moves the build cache to a fresh repository.
//!
//! Normalization follows the Docker reference grammar: a single-component name lives
//! under `docker.io/library/`, a first component without `.` or `:` (and not
//! `localhost`) is a path on `docker.io`, and `index.docker.io` is rewritten to
//! `docker.io`.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_TOTAL_LENGTH_MAX: usize = 255;
const REPOSITORY_ID_LEN: usize = 7;

static REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let alphanumeric = "[a-z0-9]+";
    let separator = "(?:[._]|__|[-]+)";
    let path_component = format!("{alphanumeric}(?:{separator}{alphanumeric})*");
    let domain_component = "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
    let domain_name = format!(r"{domain_component}(?:\.{domain_component})*");
    let ipv6 = r"\[(?:[a-fA-F0-9:]+)\]";
    let domain = format!("(?:{domain_name}|{ipv6})(?::[0-9]+)?");
    let name = format!("(?:{domain}/)?{path_component}(?:/{path_component})*");
    let tag = r"[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}";
    let digest = r"[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}";
    Regex::new(&format!("^({name})(?::({tag}))?(?:@({digest}))?$"))
        .expect("reference grammar is a valid regex")
});

static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-f0-9]{64}$").expect("identifier is a valid regex"));

/// Parses `reference` and returns its fully-qualified name without tag or digest.
///
/// `ubuntu:22.04` becomes `docker.io/library/ubuntu`,
/// `ghcr.io/org/img@sha256:...` becomes `ghcr.io/org/img`.
pub fn normalize_name(reference: &str) -> Result<String> {
    if IDENTIFIER_REGEX.is_match(reference) {
        return Err(CoreError::invalid_reference(
            reference,
            "cannot specify 64-byte hexadecimal strings",
        ));
    }

    let (domain, remainder) = split_domain(reference);
    let remote_name = match remainder.find(':') {
        Some(idx) => &remainder[..idx],
        None => remainder.as_str(),
    };
    if remote_name.to_ascii_lowercase() != remote_name {
        return Err(CoreError::invalid_reference(
            reference,
            "repository name must be lowercase",
        ));
    }

    let qualified = format!("{domain}/{remainder}");
    let captures = REFERENCE_REGEX
        .captures(&qualified)
        .ok_or_else(|| CoreError::invalid_reference(reference, "invalid reference format"))?;
    let name = captures
        .get(1)
        .map(|m| m.as_str())
        .ok_or_else(|| CoreError::invalid_reference(reference, "repository name is empty"))?;
    if name.len() > NAME_TOTAL_LENGTH_MAX {
        return Err(CoreError::invalid_reference(
            reference,
            format!("repository name must not be more than {NAME_TOTAL_LENGTH_MAX} characters"),
        ));
    }

    Ok(name.to_string())
}

/// Splits a reference into its registry domain and the remaining path.
fn split_domain(reference: &str) -> (String, String) {
    let (mut domain, mut remainder) = match reference.split_once('/') {
        Some((first, rest))
            if first.contains(['.', ':'])
                || first == "localhost"
                || first.to_ascii_lowercase() != first =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_DOMAIN.to_string(), reference.to_string()),
    };

    if domain == LEGACY_DEFAULT_DOMAIN {
        domain = DEFAULT_DOMAIN.to_string();
    }
    if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
        remainder = format!("{OFFICIAL_REPO_PREFIX}{remainder}");
    }

    (domain, remainder)
}

/// Returns the 7-character repository id for a base image and the two versions.
///
/// Unparsable references are hashed verbatim so a malformed image never fails a
/// reconcile; the resulting build simply fails later with a visible error.
pub fn repository_id(image: &str, binary_version: &str, runner_version: &str) -> String {
    let name = normalize_name(image).unwrap_or_else(|_| image.to_string());

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(binary_version.as_bytes());
    hasher.update(runner_version.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(REPOSITORY_ID_LEN);
    digest
}
