//! In-memory resource store backend for the garc controller.
//!
//! This crate provides an in-process implementation of the `ResourceStore` and
//! `EventSink` traits from `garc-storage`. It behaves like the API server where the
//! controller depends on it: it assigns `uid` and `resourceVersion`, rejects stale
//! updates, and answers owner-index queries from controller owner references.
//!
//! # Example
//!
//! ```ignore
//! use garc_db_memory::InMemoryStore;
//! use garc_storage::ResourceStore;
//!
//! let store = InMemoryStore::new();
//! let created = store.create(&config_map).await?;
//! assert!(created.metadata.uid.is_some());
//! ```

mod events;
mod storage;

pub use events::{InMemoryEventSink, RecordedEvent};
pub use storage::{InMemoryStore, OperationCounts, StorageKey};

// Re-export the storage traits for convenience
pub use garc_storage::{EventSink, ResourceStore, StorageError};
