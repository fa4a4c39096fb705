//! Event sink that keeps published events in memory.

use async_trait::async_trait;
use garc_storage::{EventSink, ObjectEvent, StorageResult};
use k8s_openapi::api::core::v1::ObjectReference;
use tokio::sync::Mutex;

/// An event together with the object it was attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub event: ObjectEvent,
}

/// Collects events instead of sending them anywhere.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event published so far, oldest first.
    pub async fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().await.clone()
    }

    /// Returns the events published with `reason`.
    pub async fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|recorded| recorded.event.reason == reason)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, regarding: &ObjectReference, event: &ObjectEvent) -> StorageResult<()> {
        self.events.lock().await.push(RecordedEvent {
            kind: regarding.kind.clone().unwrap_or_default(),
            namespace: regarding.namespace.clone().unwrap_or_default(),
            name: regarding.name.clone().unwrap_or_default(),
            event: event.clone(),
        });
        Ok(())
    }
}
