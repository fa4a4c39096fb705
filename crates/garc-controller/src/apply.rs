//! Fetch, compare, create or update one child object.
//!
//! Each child kind compares only the fields the controller owns. Everything else on the
//! observed object (status, defaults, fields written by other actors) is left alone, so
//! a converged child is never rewritten.

use std::fmt;

use garc_storage::{EventSink, ObjectEvent, ResourceStore, StorageError, StoredObject};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, ObjectReference, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// What applying a desired object did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
    /// Lost an optimistic-concurrency race; retry shortly.
    Conflict,
}

impl ApplyOutcome {
    pub fn is_conflict(self) -> bool {
        self == Self::Conflict
    }

    pub fn changed(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// The owner-controlled part of a child kind.
pub trait ManagedFields: StoredObject {
    /// How the kind is named in event messages on creation and update.
    const CREATED_NOUN: &'static str;
    const UPDATED_NOUN: &'static str;

    /// True when `observed` differs from `desired` in a managed field.
    fn differs(observed: &Self, desired: &Self) -> bool;

    /// Copies the managed fields of `desired` onto `observed`.
    fn take_managed(observed: &mut Self, desired: Self);
}

impl ManagedFields for Secret {
    const CREATED_NOUN: &'static str = "token secret";
    const UPDATED_NOUN: &'static str = "token secret";

    /// Token material and the annotations the controller writes.
    fn differs(observed: &Self, desired: &Self) -> bool {
        if observed.data != desired.data {
            return true;
        }
        let observed_annotations = observed.metadata.annotations.as_ref();
        desired
            .metadata
            .annotations
            .iter()
            .flatten()
            .any(|(key, value)| observed_annotations.and_then(|a| a.get(key)) != Some(value))
    }

    fn take_managed(observed: &mut Self, desired: Self) {
        if let Some(annotations) = desired.metadata.annotations {
            observed
                .metadata
                .annotations
                .get_or_insert_with(Default::default)
                .extend(annotations);
        }
        observed.data = desired.data;
        observed.string_data = None;
    }
}

impl ManagedFields for ConfigMap {
    const CREATED_NOUN: &'static str = "workspace config map";
    const UPDATED_NOUN: &'static str = "config map";

    fn differs(observed: &Self, desired: &Self) -> bool {
        observed.data != desired.data || observed.binary_data != desired.binary_data
    }

    fn take_managed(observed: &mut Self, desired: Self) {
        observed.data = desired.data;
        observed.binary_data = desired.binary_data;
    }
}

impl ManagedFields for Deployment {
    const CREATED_NOUN: &'static str = "deployment";
    const UPDATED_NOUN: &'static str = "deployment";

    /// The whole pod template.
    fn differs(observed: &Self, desired: &Self) -> bool {
        observed.spec.as_ref().map(|s| &s.template) != desired.spec.as_ref().map(|s| &s.template)
    }

    fn take_managed(observed: &mut Self, desired: Self) {
        match (observed.spec.as_mut(), desired.spec) {
            (Some(observed_spec), Some(desired_spec)) => {
                observed_spec.template = desired_spec.template;
            }
            (None, desired_spec) => observed.spec = desired_spec,
            (Some(_), None) => {}
        }
    }
}

/// Applies desired children of one Runner.
pub struct Applier<'a, S, E> {
    store: &'a S,
    events: &'a E,
    owner: OwnerReference,
    regarding: ObjectReference,
}

impl<'a, S: ResourceStore, E: EventSink> Applier<'a, S, E> {
    /// `owner` is attached to every created child; events are published on `regarding`.
    pub fn new(store: &'a S, events: &'a E, owner: OwnerReference, regarding: ObjectReference) -> Self {
        Self {
            store,
            events,
            owner,
            regarding,
        }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    pub async fn apply_secret(
        &self,
        observed: Option<Secret>,
        desired: Secret,
    ) -> Result<ApplyOutcome, StorageError> {
        self.apply(observed, desired).await
    }

    pub async fn apply_config_map(
        &self,
        observed: Option<ConfigMap>,
        desired: ConfigMap,
    ) -> Result<ApplyOutcome, StorageError> {
        self.apply(observed, desired).await
    }

    pub async fn apply_deployment(
        &self,
        observed: Option<Deployment>,
        desired: Deployment,
    ) -> Result<ApplyOutcome, StorageError> {
        self.apply(observed, desired).await
    }

    async fn apply<K: ManagedFields>(
        &self,
        observed: Option<K>,
        mut desired: K,
    ) -> Result<ApplyOutcome, StorageError> {
        let name = desired.meta().name.clone().unwrap_or_default();

        let Some(mut observed) = observed else {
            desired.meta_mut().owner_references = Some(vec![self.owner.clone()]);
            return match self.store.create(&desired).await {
                Ok(_) => {
                    tracing::info!(kind = %K::kind(&()), %name, "created");
                    self.notify(ObjectEvent::normal(
                        "SuccessfulCreated",
                        "Create",
                        format!("Created {}: {name:?}", K::CREATED_NOUN),
                    ))
                    .await;
                    Ok(ApplyOutcome::Created)
                }
                // Created by someone else since we looked; the next pass sees it
                Err(e) if e.is_already_exists() => Ok(ApplyOutcome::Conflict),
                Err(e) => Err(e),
            };
        };

        if !K::differs(&observed, &desired) {
            tracing::debug!(kind = %K::kind(&()), %name, "unchanged");
            return Ok(ApplyOutcome::Unchanged);
        }

        K::take_managed(&mut observed, desired);
        match self.store.update(&observed).await {
            Ok(_) => {
                tracing::info!(kind = %K::kind(&()), %name, "updated");
                self.notify(ObjectEvent::normal(
                    "SuccessfulUpdated",
                    "Update",
                    format!("Updated {}: {name:?}", K::UPDATED_NOUN),
                ))
                .await;
                Ok(ApplyOutcome::Updated)
            }
            Err(e) if e.is_version_conflict() => {
                tracing::debug!(kind = %K::kind(&()), %name, error = %e, "update conflict");
                Ok(ApplyOutcome::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    /// Publishes an event on the Runner. Event delivery never fails a pass.
    pub async fn notify(&self, event: ObjectEvent) {
        if let Err(e) = self.events.publish(&self.regarding, &event).await {
            tracing::warn!(reason = %event.reason, error = %e, "failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use garc_db_memory::{InMemoryEventSink, InMemoryStore};
    use k8s_openapi::ByteString;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "github-actions-runner.kaidotio.github.io/v1".into(),
            kind: "Runner".into(),
            name: "build".into(),
            uid: "runner-uid".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn regarding() -> ObjectReference {
        ObjectReference {
            kind: Some("Runner".into()),
            name: Some("build".into()),
            namespace: Some("ci".into()),
            ..Default::default()
        }
    }

    fn secret(token: &str, expires_at: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("build".into()),
                namespace: Some("ci".into()),
                annotations: Some(BTreeMap::from([(
                    "github-actions-runner.kaidotio.github.io/expiresAt".to_string(),
                    expires_at.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "GITHUB_TOKEN".to_string(),
                ByteString(token.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }
    }

    fn config_map(dockerfile: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("build-workspace".into()),
                namespace: Some("ci".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("Dockerfile".to_string(), dockerfile.to_string())])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_attaches_owner_and_records_event() {
        let store = InMemoryStore::new();
        let events = InMemoryEventSink::new();
        let applier = Applier::new(&store, &events, owner(), regarding());

        let outcome = applier.apply_config_map(None, config_map("FROM a")).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);

        let stored: ConfigMap = store.get("ci", "build-workspace").await.unwrap().unwrap();
        assert_eq!(stored.metadata.owner_references, Some(vec![owner()]));

        let recorded = events.events().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event.reason, "SuccessfulCreated");
        assert_eq!(
            recorded[0].event.note,
            "Created workspace config map: \"build-workspace\""
        );
    }

    #[tokio::test]
    async fn test_unchanged_object_is_not_written() {
        let store = InMemoryStore::new();
        let events = InMemoryEventSink::new();
        let applier = Applier::new(&store, &events, owner(), regarding());
        applier.apply_config_map(None, config_map("FROM a")).await.unwrap();

        let observed = store.get("ci", "build-workspace").await.unwrap();
        let outcome = applier.apply_config_map(observed, config_map("FROM a")).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(store.counts().updates, 0);
    }

    #[tokio::test]
    async fn test_update_keeps_foreign_annotations() {
        let store = InMemoryStore::new();
        let events = InMemoryEventSink::new();
        let applier = Applier::new(&store, &events, owner(), regarding());

        let mut initial = secret("old", "2030-01-01T00:00:00Z");
        initial
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert("team".into(), "platform".into());
        store.create(&initial).await.unwrap();

        let observed: Option<Secret> = store.get("ci", "build").await.unwrap();
        let outcome = applier
            .apply_secret(observed, secret("new", "2030-01-01T01:00:00Z"))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let stored: Secret = store.get("ci", "build").await.unwrap().unwrap();
        let annotations = stored.metadata.annotations.unwrap();
        assert_eq!(annotations["team"], "platform");
        assert_eq!(
            annotations["github-actions-runner.kaidotio.github.io/expiresAt"],
            "2030-01-01T01:00:00Z"
        );
        assert_eq!(stored.data.unwrap()["GITHUB_TOKEN"].0, b"new".to_vec());
        assert_eq!(events.with_reason("SuccessfulUpdated").await.len(), 1);
    }

    #[test]
    fn test_secret_ignores_unmanaged_annotations() {
        let mut observed = secret("tok", "2030-01-01T00:00:00Z");
        observed
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert("kubectl.kubernetes.io/last-applied-configuration".into(), "{}".into());
        assert!(!Secret::differs(&observed, &secret("tok", "2030-01-01T00:00:00Z")));
        assert!(Secret::differs(&observed, &secret("tok", "2030-01-01T00:01:00Z")));
    }

    #[tokio::test]
    async fn test_version_conflict_is_an_outcome() {
        let store = InMemoryStore::new();
        let events = InMemoryEventSink::new();
        let applier = Applier::new(&store, &events, owner(), regarding());
        applier.apply_config_map(None, config_map("FROM a")).await.unwrap();

        store.inject_conflict::<ConfigMap>().await;
        let observed = store.get("ci", "build-workspace").await.unwrap();
        let outcome = applier.apply_config_map(observed, config_map("FROM b")).await.unwrap();
        assert!(outcome.is_conflict());
        assert!(events.with_reason("SuccessfulUpdated").await.is_empty());
    }

    #[tokio::test]
    async fn test_deployment_compares_template_only() {
        let mut desired = Deployment {
            metadata: ObjectMeta {
                name: Some("build-runner".into()),
                namespace: Some("ci".into()),
                ..Default::default()
            },
            spec: Some(Default::default()),
            ..Default::default()
        };
        let mut observed = desired.clone();
        observed.spec.as_mut().unwrap().replicas = Some(3);
        assert!(!Deployment::differs(&observed, &desired));

        desired.spec.as_mut().unwrap().template.metadata = Some(ObjectMeta {
            labels: Some(BTreeMap::from([("app".to_string(), "build-runner".to_string())])),
            ..Default::default()
        });
        assert!(Deployment::differs(&observed, &desired));

        Deployment::take_managed(&mut observed, desired.clone());
        assert_eq!(observed.spec.as_ref().unwrap().replicas, Some(3));
        assert!(!Deployment::differs(&observed, &desired));
    }
}
