use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use garc_storage::{ResourceStore, StorageError, StorageResult, StoredObject, is_controlled_by};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

pub type StorageKey = String; // Format: "Kind/namespace/name"

pub(crate) fn make_storage_key(kind: &str, namespace: &str, name: &str) -> StorageKey {
    format!("{kind}/{namespace}/{name}")
}

/// Number of mutating calls served, for idempotence checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
}

impl OperationCounts {
    /// Total number of mutating calls.
    pub fn total(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

/// In-memory resource store.
///
/// Objects are kept as JSON so every read returns an independent copy, the same way a
/// remote store would.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Stored objects keyed by kind, namespace and name
    data: RwLock<BTreeMap<StorageKey, Value>>,
    /// Counter backing `resourceVersion`
    version_counter: AtomicU64,
    /// Kinds whose next update fails with a version conflict
    pending_conflicts: Mutex<HashSet<String>>,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            version_counter: AtomicU64::new(1),
            ..Default::default()
        }
    }

    /// Generates the next resource version.
    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    /// Makes the next update of kind `K` fail with a version conflict, as if another
    /// writer had modified the object in between.
    pub async fn inject_conflict<K: StoredObject>(&self) {
        self.pending_conflicts
            .lock()
            .await
            .insert(K::kind(&()).to_string());
    }

    /// Returns how many mutating calls were served so far.
    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            creates: self.creates.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    /// Returns the number of stored objects of kind `K` in `namespace`.
    pub async fn count_of<K: StoredObject>(&self, namespace: &str) -> usize {
        let prefix = make_storage_key(&K::kind(&()), namespace, "");
        let guard = self.data.read().await;
        guard.keys().filter(|key| key.starts_with(&prefix)).count()
    }

    fn key_of<K: StoredObject>(object: &K) -> StorageResult<(String, String, StorageKey)> {
        let meta = object.meta();
        let namespace = meta
            .namespace
            .clone()
            .ok_or_else(|| StorageError::invalid_object("metadata.namespace is required"))?;
        let name = meta
            .name
            .clone()
            .ok_or_else(|| StorageError::invalid_object("metadata.name is required"))?;
        let key = make_storage_key(&K::kind(&()), &namespace, &name);
        Ok((namespace, name, key))
    }

    fn decode<K: StoredObject>(value: &Value) -> StorageResult<K> {
        serde_json::from_value(value.clone())
            .map_err(|e| StorageError::internal(format!("Failed to decode {}: {e}", K::kind(&()))))
    }

    fn encode<K: StoredObject>(object: &K) -> StorageResult<Value> {
        serde_json::to_value(object)
            .map_err(|e| StorageError::invalid_object(format!("Failed to encode {}: {e}", K::kind(&()))))
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get<K: StoredObject>(&self, namespace: &str, name: &str) -> StorageResult<Option<K>> {
        let key = make_storage_key(&K::kind(&()), namespace, name);
        let guard = self.data.read().await;
        guard.get(&key).map(Self::decode).transpose()
    }

    async fn list_owned<K: StoredObject>(
        &self,
        namespace: &str,
        owner_kind: &str,
        owner_name: &str,
    ) -> StorageResult<Vec<ObjectMeta>> {
        let prefix = make_storage_key(&K::kind(&()), namespace, "");
        let guard = self.data.read().await;
        let mut owned = Vec::new();
        for (_, value) in guard.iter().filter(|(key, _)| key.starts_with(&prefix)) {
            let object: K = Self::decode(value)?;
            if is_controlled_by(object.meta(), owner_kind, owner_name) {
                owned.push(object.meta().clone());
            }
        }
        Ok(owned)
    }

    async fn create<K: StoredObject>(&self, object: &K) -> StorageResult<K> {
        let (namespace, name, key) = Self::key_of(object)?;
        let mut guard = self.data.write().await;
        if guard.contains_key(&key) {
            return Err(StorageError::already_exists(K::kind(&()), namespace, name));
        }

        let mut stored = object.clone();
        let meta = stored.meta_mut();
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = Some(self.next_version());
        guard.insert(key, Self::encode(&stored)?);
        self.creates.fetch_add(1, Ordering::SeqCst);

        tracing::trace!(kind = %K::kind(&()), %namespace, %name, "created");
        Ok(stored)
    }

    async fn update<K: StoredObject>(&self, object: &K) -> StorageResult<K> {
        let (namespace, name, key) = Self::key_of(object)?;
        let kind = K::kind(&()).to_string();

        if self.pending_conflicts.lock().await.remove(&kind) {
            return Err(StorageError::version_conflict(
                kind,
                name,
                "the object has been modified; please apply your changes to the latest version and try again",
            ));
        }

        let mut guard = self.data.write().await;
        let current: K = guard
            .get(&key)
            .map(Self::decode)
            .transpose()?
            .ok_or_else(|| StorageError::not_found(kind.clone(), namespace.clone(), name.clone()))?;

        let current_version = current.meta().resource_version.clone();
        if let Some(expected) = object.meta().resource_version.as_ref()
            && current_version.as_ref() != Some(expected)
        {
            return Err(StorageError::version_conflict(
                kind,
                name,
                format!(
                    "expected resourceVersion {expected}, found {}",
                    current_version.unwrap_or_default()
                ),
            ));
        }

        let mut stored = object.clone();
        let meta = stored.meta_mut();
        meta.uid = current.meta().uid.clone();
        meta.resource_version = Some(self.next_version());
        guard.insert(key, Self::encode(&stored)?);
        self.updates.fetch_add(1, Ordering::SeqCst);

        tracing::trace!(%kind, %namespace, %name, "updated");
        Ok(stored)
    }

    async fn delete<K: StoredObject>(&self, namespace: &str, name: &str) -> StorageResult<()> {
        let key = make_storage_key(&K::kind(&()), namespace, name);
        let mut guard = self.data.write().await;
        guard
            .remove(&key)
            .ok_or_else(|| StorageError::not_found(K::kind(&()), namespace, name))?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn config_map(name: &str, owner: Option<&str>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ci".to_string()),
                owner_references: owner.map(|owner| {
                    vec![OwnerReference {
                        api_version: "github-actions-runner.kaidotio.github.io/v1".to_string(),
                        kind: "Runner".to_string(),
                        name: owner.to_string(),
                        uid: "owner-uid".to_string(),
                        controller: Some(true),
                        block_owner_deletion: Some(true),
                    }]
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_uid_and_version() {
        let store = InMemoryStore::new();
        let created = store.create(&config_map("a", None)).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());

        let fetched: ConfigMap = store.get("ci", "a").await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get::<ConfigMap>("other", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.create(&config_map("a", None)).await.unwrap();
        let err = store.create(&config_map("a", None)).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_rejects_stale_version() {
        let store = InMemoryStore::new();
        let created = store.create(&config_map("a", None)).await.unwrap();

        let mut first = created.clone();
        first.data = Some([("k".to_string(), "1".to_string())].into());
        store.update(&first).await.unwrap();

        let mut second = created;
        second.data = Some([("k".to_string(), "2".to_string())].into());
        let err = store.update(&second).await.unwrap_err();
        assert!(err.is_version_conflict());
        assert_eq!(store.counts().updates, 1);
    }

    #[tokio::test]
    async fn test_injected_conflict_fires_once() {
        let store = InMemoryStore::new();
        let created = store.create(&config_map("a", None)).await.unwrap();
        store.inject_conflict::<ConfigMap>().await;

        assert!(store.update(&created).await.unwrap_err().is_version_conflict());
        store.update(&created).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_owned_uses_controller_reference() {
        let store = InMemoryStore::new();
        store.create(&config_map("mine", Some("build"))).await.unwrap();
        store.create(&config_map("theirs", Some("deploy"))).await.unwrap();
        store.create(&config_map("loose", None)).await.unwrap();

        let owned = store.list_owned::<ConfigMap>("ci", "Runner", "build").await.unwrap();
        let names: Vec<_> = owned.iter().filter_map(|meta| meta.name.as_deref()).collect();
        assert_eq!(names, vec!["mine"]);
        assert_eq!(store.count_of::<ConfigMap>("ci").await, 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        store.create(&config_map("a", None)).await.unwrap();
        store.delete::<ConfigMap>("ci", "a").await.unwrap();
        assert!(store.get::<ConfigMap>("ci", "a").await.unwrap().is_none());
        assert!(store.delete::<ConfigMap>("ci", "a").await.unwrap_err().is_not_found());
        assert_eq!(store.counts().total(), 2);
    }
}
