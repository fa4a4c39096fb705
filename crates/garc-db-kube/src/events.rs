//! Event publication through the kube-rs recorder.

use async_trait::async_trait;
use garc_storage::{EventSink, EventType, ObjectEvent, StorageError, StorageResult};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};

/// Publishes [`ObjectEvent`]s as `events.k8s.io/v1` Events.
#[derive(Clone)]
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Creates a recorder reporting as `controller`.
    ///
    /// The pod name, when set in `POD_NAME`, is reported as the instance.
    #[must_use]
    pub fn new(client: Client, controller: impl Into<String>) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventRecorder {
    async fn publish(&self, regarding: &ObjectReference, event: &ObjectEvent) -> StorageResult<()> {
        let type_ = match event.event_type {
            EventType::Normal => KubeEventType::Normal,
            EventType::Warning => KubeEventType::Warning,
        };
        let kube_event = Event {
            type_,
            reason: event.reason.clone(),
            note: Some(event.note.clone()),
            action: event.action.clone(),
            secondary: None,
        };
        self.recorder
            .publish(&kube_event, regarding)
            .await
            .map_err(|e| StorageError::connection_error(e.to_string()))
    }
}
