//! Owner index.
//!
//! Children are attributed to their owner through the controller owner reference.
//! Backends use these helpers to answer `list_owned` the same way.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Returns the owner reference marked as controller, if any.
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_deref()?
        .iter()
        .find(|reference| reference.controller == Some(true))
}

/// Returns `true` if `meta` is controlled by an object of `owner_kind` named `owner_name`.
pub fn is_controlled_by(meta: &ObjectMeta, owner_kind: &str, owner_name: &str) -> bool {
    controller_owner(meta)
        .is_some_and(|owner| owner.kind == owner_kind && owner.name == owner_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(kind: &str, name: &str, controller: Option<bool>) -> OwnerReference {
        OwnerReference {
            api_version: "github-actions-runner.kaidotio.github.io/v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: "uid-1".to_string(),
            controller,
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn test_controller_owner_picks_controller_reference() {
        let meta = ObjectMeta {
            owner_references: Some(vec![
                reference("Runner", "other", None),
                reference("Runner", "build", Some(true)),
            ]),
            ..Default::default()
        };
        assert_eq!(controller_owner(&meta).map(|o| o.name.as_str()), Some("build"));
        assert!(is_controlled_by(&meta, "Runner", "build"));
        assert!(!is_controlled_by(&meta, "Runner", "other"));
    }

    #[test]
    fn test_is_controlled_by_checks_kind() {
        let meta = ObjectMeta {
            owner_references: Some(vec![reference("ReplicaSet", "build", Some(true))]),
            ..Default::default()
        };
        assert!(!is_controlled_by(&meta, "Runner", "build"));
        assert!(!is_controlled_by(&ObjectMeta::default(), "Runner", "build"));
    }
}
