//! Typed CRUD through `kube::Api`.

use async_trait::async_trait;
use garc_storage::{ResourceStore, StorageError, StorageResult, StoredObject, is_controlled_by};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};

use crate::error::map_kube_error;

/// Resource store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Creates a store on top of an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoredObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn identity<K: StoredObject>(object: &K) -> StorageResult<(&str, &str)> {
        let meta = object.meta();
        let namespace = meta
            .namespace
            .as_deref()
            .ok_or_else(|| StorageError::invalid_object("metadata.namespace is required"))?;
        let name = meta
            .name
            .as_deref()
            .ok_or_else(|| StorageError::invalid_object("metadata.name is required"))?;
        Ok((namespace, name))
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get<K: StoredObject>(&self, namespace: &str, name: &str) -> StorageResult<Option<K>> {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), namespace, name))
    }

    async fn list_owned<K: StoredObject>(
        &self,
        namespace: &str,
        owner_kind: &str,
        owner_name: &str,
    ) -> StorageResult<Vec<ObjectMeta>> {
        // Owner references cannot be selected server-side, so this lists the metadata
        // of every object of the kind in the namespace on each call.
        let list = self
            .api::<K>(namespace)
            .list_metadata(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), namespace, ""))?;

        Ok(list
            .items
            .into_iter()
            .map(|partial| partial.metadata)
            .filter(|meta| is_controlled_by(meta, owner_kind, owner_name))
            .collect())
    }

    async fn create<K: StoredObject>(&self, object: &K) -> StorageResult<K> {
        let (namespace, name) = Self::identity(object)?;
        let created = self
            .api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), namespace, name))?;
        tracing::trace!(kind = %K::kind(&()), namespace, name, "created");
        Ok(created)
    }

    async fn update<K: StoredObject>(&self, object: &K) -> StorageResult<K> {
        let (namespace, name) = Self::identity(object)?;
        let replaced = self
            .api::<K>(namespace)
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), namespace, name))?;
        tracing::trace!(kind = %K::kind(&()), namespace, name, "replaced");
        Ok(replaced)
    }

    async fn delete<K: StoredObject>(&self, namespace: &str, name: &str) -> StorageResult<()> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), namespace, name))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "kubernetes"
    }
}
