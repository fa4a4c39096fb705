//! # garc-storage
//!
//! Storage abstraction for the runner controller.
//!
//! The controller never talks to a cluster directly; it reads and writes its children
//! through [`ResourceStore`] and reports what it did through [`EventSink`]. Backends
//! live in separate crates:
//!
//! - `garc-db-kube` - the Kubernetes API via kube-rs
//! - `garc-db-memory` - an in-process store for tests and dry runs
//!
//! ## Example
//!
//! ```ignore
//! use garc_storage::{ResourceStore, StorageResult};
//! use k8s_openapi::api::core::v1::ConfigMap;
//!
//! async fn workspace<S: ResourceStore>(store: &S) -> StorageResult<Option<ConfigMap>> {
//!     store.get::<ConfigMap>("ci", "build-workspace").await
//! }
//! ```

mod error;
pub mod owner;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use owner::{controller_owner, is_controlled_by};
pub use traits::{EventSink, ResourceStore, StoredObject};
pub use types::{EventType, ObjectEvent};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::StorageResult;
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{EventSink, ResourceStore, StoredObject};
    pub use crate::types::{EventType, ObjectEvent};
}
