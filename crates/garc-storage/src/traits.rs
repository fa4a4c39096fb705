//! Storage traits for the resource store abstraction.
//!
//! This module defines the contract every backend implements.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::StorageResult;
use crate::types::ObjectEvent;

/// Namespaced object kinds a [`ResourceStore`] can hold.
pub trait StoredObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Namespaced CRUD over typed objects.
///
/// Implementations must be thread-safe (`Send + Sync`) and must enforce optimistic
/// concurrency on [`update`](ResourceStore::update): an object carrying a stale
/// `resourceVersion` is rejected with `StorageError::VersionConflict`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Reads an object by namespace and name.
    ///
    /// Returns `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing objects.
    async fn get<K: StoredObject>(&self, namespace: &str, name: &str) -> StorageResult<Option<K>>;

    /// Lists the metadata of objects of kind `K` whose controller owner reference
    /// points at `owner_kind`/`owner_name`.
    ///
    /// Only metadata is returned; callers that need the full object `get` it by name.
    async fn list_owned<K: StoredObject>(
        &self,
        namespace: &str,
        owner_kind: &str,
        owner_name: &str,
    ) -> StorageResult<Vec<ObjectMeta>>;

    /// Creates a new object and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if an object with the same name exists.
    async fn create<K: StoredObject>(&self, object: &K) -> StorageResult<K>;

    /// Replaces an existing object and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    /// Returns `StorageError::VersionConflict` if the object changed since it was read.
    async fn update<K: StoredObject>(&self, object: &K) -> StorageResult<K>;

    /// Deletes an object by namespace and name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    async fn delete<K: StoredObject>(&self, namespace: &str, name: &str) -> StorageResult<()>;

    /// Returns the name of this backend for logging.
    fn backend_name(&self) -> &'static str;
}

/// Receiver of human-readable events attached to an object.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes `event` about the object identified by `regarding`.
    async fn publish(&self, regarding: &ObjectReference, event: &ObjectEvent) -> StorageResult<()>;
}
