use garc_storage::StorageError;

/// Status reason the API server reports when a create collides with an existing name.
const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// Maps a kube client error about `kind` `namespace/name` onto a [`StorageError`].
///
/// A `409` is a version conflict unless the API server says the name is taken.
pub fn map_kube_error(err: kube::Error, kind: &str, namespace: &str, name: &str) -> StorageError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => StorageError::not_found(kind, namespace, name),
            409 if response.reason == REASON_ALREADY_EXISTS => {
                StorageError::already_exists(kind, namespace, name)
            }
            409 => StorageError::version_conflict(kind, name, response.message),
            400 | 422 => StorageError::invalid_object(response.message),
            code => StorageError::internal(format!("{kind} {namespace}/{name}: {code} {}", response.message)),
        },
        other => StorageError::connection_error(other.to_string()),
    }
}
