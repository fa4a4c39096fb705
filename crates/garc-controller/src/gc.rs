//! Removal of children that no longer carry their canonical name.

use garc_core::naming::{self, OWNER_KIND};
use garc_storage::{EventSink, ObjectEvent, ResourceStore, StorageError, StoredObject};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Resource;

use crate::apply::Applier;

/// Deletes every Secret, ConfigMap and Deployment controlled by Runner `name` whose
/// name is not the canonical one for its kind. Returns the deleted names.
pub async fn collect_orphans<S: ResourceStore, E: EventSink>(
    applier: &Applier<'_, S, E>,
    namespace: &str,
    name: &str,
) -> Result<Vec<String>, StorageError> {
    let mut deleted = Vec::new();
    deleted.extend(
        collect::<Secret, S, E>(applier, namespace, name, &naming::credential_name(name), "secret")
            .await?,
    );
    deleted.extend(
        collect::<ConfigMap, S, E>(
            applier,
            namespace,
            name,
            &naming::workspace_name(name),
            "config map",
        )
        .await?,
    );
    deleted.extend(
        collect::<Deployment, S, E>(
            applier,
            namespace,
            name,
            &naming::workload_name(name),
            "deployment",
        )
        .await?,
    );
    Ok(deleted)
}

async fn collect<K: StoredObject, S: ResourceStore, E: EventSink>(
    applier: &Applier<'_, S, E>,
    namespace: &str,
    owner: &str,
    canonical: &str,
    noun: &str,
) -> Result<Vec<String>, StorageError> {
    let store = applier.store();
    let owned = store.list_owned::<K>(namespace, OWNER_KIND, owner).await?;

    let mut deleted = Vec::new();
    for meta in owned {
        let Some(child_name) = meta.name else {
            continue;
        };
        if child_name == canonical {
            continue;
        }

        match store.delete::<K>(namespace, &child_name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
        tracing::info!(kind = %K::kind(&()), name = %child_name, "deleted orphan");
        applier
            .notify(ObjectEvent::normal(
                "SuccessfulDeleted",
                "Delete",
                format!("Deleted {noun}: {child_name:?}"),
            ))
            .await;
        deleted.push(child_name);
    }
    Ok(deleted)
}
