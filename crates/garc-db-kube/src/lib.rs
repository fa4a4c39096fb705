//! Kubernetes API backend for the garc controller.
//!
//! This crate implements the `ResourceStore` and `EventSink` traits from
//! `garc-storage` on top of kube-rs. Reads and writes go straight to the API server;
//! optimistic concurrency is the API server's own `resourceVersion` check.
//!
//! # Example
//!
//! ```ignore
//! use garc_db_kube::{KubeEventRecorder, KubeStore};
//!
//! let client = kube::Client::try_default().await?;
//! let store = KubeStore::new(client.clone());
//! let events = KubeEventRecorder::new(client, "garc-controller");
//! ```
//!
//! # Architecture
//!
//! - [`storage`]: typed CRUD through `kube::Api`
//! - [`events`]: event publication through `kube::runtime::events::Recorder`
//! - `error`: mapping of API status codes onto `StorageError`

mod error;
pub mod events;
pub mod storage;

pub use error::map_kube_error;
pub use events::KubeEventRecorder;
pub use storage::KubeStore;

pub use garc_storage::{EventSink, ResourceStore, StorageError};
