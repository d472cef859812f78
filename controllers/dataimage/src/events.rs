//! Audit events for DataImage reconciliation.
//!
//! Events produced during a pass (by the provisioner or the reconciler) are
//! collected in an `EventBuffer` and only handed to the `EventRecorder` once
//! the pass has written its status. Recording is best effort: a failed event
//! is logged and skipped, it never fails the pass.

use crate::store::ResourceKey;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use crds::DataImage;
use k8s_openapi::api::core::v1::Event;
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use provisioner_client::EventPublisher;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Component reported as the event source
pub const EVENT_COMPONENT: &str = "dcops-dataimage-controller";

/// Controller reported as the event's reporting controller
pub const REPORTING_CONTROLLER: &str = "dcops.microscaler.io/dataimage-controller";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The API server refused the event
    #[error("event rejected: {0}")]
    Rejected(String),
}

/// Kubernetes event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    /// Routine lifecycle fact
    Normal,
    /// Something an operator may need to act on
    Warning,
}

impl EventSeverity {
    /// Value written to the event's `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// Reference to the object an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvolvedObject {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Option<String>,
}

impl InvolvedObject {
    pub fn data_image(image: &DataImage) -> Self {
        Self {
            api_version: DataImage::api_version(&()).to_string(),
            kind: DataImage::kind(&()).to_string(),
            namespace: image.namespace().unwrap_or_default(),
            name: image.name_any(),
            uid: image.uid(),
        }
    }
}

/// A single audit fact, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub reason: String,
    pub message: String,
    pub severity: EventSeverity,
    pub timestamp: DateTime<Utc>,
    pub involved: InvolvedObject,
}

impl AuditEvent {
    /// Builds the `core/v1` Event recorded for this fact.
    pub fn to_kube_event(&self) -> Result<Event, EventError> {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        let event = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": {
                "generateName": format!("{}-", self.reason),
                "namespace": self.involved.namespace,
            },
            "involvedObject": {
                "apiVersion": self.involved.api_version,
                "kind": self.involved.kind,
                "namespace": self.involved.namespace,
                "name": self.involved.name,
                "uid": self.involved.uid,
            },
            "reason": self.reason,
            "message": self.message,
            "source": { "component": EVENT_COMPONENT },
            "firstTimestamp": timestamp,
            "lastTimestamp": timestamp,
            "count": 1,
            "type": self.severity.as_str(),
            "reportingComponent": REPORTING_CONTROLLER,
        }))?;
        Ok(event)
    }
}

/// Ordered, append-only event list owned by one reconciliation pass.
///
/// Clones share the same list, which is how the provisioner's publisher
/// writes into it.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    involved: InvolvedObject,
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl EventBuffer {
    pub fn new(involved: InvolvedObject) -> Self {
        Self {
            involved,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn events(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, reason: &str, message: &str, severity: EventSeverity) {
        debug!("Buffering event {} for {}/{}", reason, self.involved.namespace, self.involved.name);
        self.events().push(AuditEvent {
            reason: reason.to_string(),
            message: message.to_string(),
            severity,
            timestamp: Utc::now(),
            involved: self.involved.clone(),
        });
    }

    /// Buffers a `Normal` event.
    pub fn publish(&self, reason: &str, message: &str) {
        self.push(reason, message, EventSeverity::Normal);
    }

    /// Callback handed to the provisioner.
    pub fn publisher(&self) -> EventPublisher {
        let buffer = self.clone();
        Arc::new(move |reason: &str, message: &str| buffer.publish(reason, message))
    }

    /// Takes every buffered event, in production order.
    pub fn drain(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut *self.events())
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destination for audit events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), EventError>;
}

/// Records events as Kubernetes `Event` objects.
#[derive(Clone)]
pub struct KubeEventSink {
    client: Client,
}

impl KubeEventSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), EventError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), &event.involved.namespace);
        api.create(&PostParams::default(), &event.to_kube_event()?)
            .await
            .map(|_| ())
            .map_err(record_error)
    }
}

fn record_error(err: kube::Error) -> EventError {
    match err {
        kube::Error::Api(resp) => EventError::Rejected(format!("{} ({})", resp.message, resp.code)),
        other => EventError::Kube(other),
    }
}

/// Flushes buffered events to a sink.
#[derive(Clone)]
pub struct EventRecorder {
    sink: Arc<dyn EventSink>,
}

impl EventRecorder {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Records `events` in order and returns how many were recorded.
    pub async fn publish(&self, key: &ResourceKey, events: Vec<AuditEvent>) -> usize {
        let mut recorded = 0;
        for event in &events {
            info!("Publishing event {} for DataImage {}: {}", event.reason, key, event.message);
            match self.sink.record(event).await {
                Ok(()) => recorded += 1,
                Err(e) => warn!(
                    "Failed to record event {} for DataImage {}, ignoring: {}",
                    event.reason, key, e
                ),
            }
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingEventSink, create_test_data_image};

    fn involved() -> InvolvedObject {
        let mut image = create_test_data_image("metal", "host-0", &[]);
        image.metadata.uid = Some("3f1c".to_string());
        InvolvedObject::data_image(&image)
    }

    #[test]
    fn test_involved_object() {
        let involved = involved();
        assert_eq!(involved.api_version, "dcops.microscaler.io/v1alpha1");
        assert_eq!(involved.kind, "DataImage");
        assert_eq!(involved.namespace, "metal");
        assert_eq!(involved.name, "host-0");
        assert_eq!(involved.uid.as_deref(), Some("3f1c"));
    }

    #[test]
    fn test_buffer_keeps_production_order() {
        let buffer = EventBuffer::new(involved());
        let publisher = buffer.publisher();
        buffer.publish("First", "one");
        publisher("Second", "two");
        buffer.push("Third", "three", EventSeverity::Warning);

        assert_eq!(buffer.len(), 3);
        let events = buffer.drain();
        let reasons: Vec<_> = events.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["First", "Second", "Third"]);
        assert_eq!(events[1].severity, EventSeverity::Normal);
        assert_eq!(events[2].severity, EventSeverity::Warning);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_kube_event_shape() {
        let buffer = EventBuffer::new(involved());
        buffer.publish("DataImageError", "eject failed");
        let event = buffer.drain().remove(0).to_kube_event().unwrap();

        assert_eq!(event.metadata.generate_name.as_deref(), Some("DataImageError-"));
        assert_eq!(event.metadata.namespace.as_deref(), Some("metal"));
        assert_eq!(event.involved_object.kind.as_deref(), Some("DataImage"));
        assert_eq!(event.involved_object.uid.as_deref(), Some("3f1c"));
        assert_eq!(event.reason.as_deref(), Some("DataImageError"));
        assert_eq!(event.message.as_deref(), Some("eject failed"));
        assert_eq!(event.type_.as_deref(), Some("Normal"));
        assert_eq!(event.count, Some(1));
        assert_eq!(
            event.source.and_then(|s| s.component).as_deref(),
            Some(EVENT_COMPONENT)
        );
        assert_eq!(event.reporting_component.as_deref(), Some(REPORTING_CONTROLLER));
        assert!(event.first_timestamp.is_some());
    }

    #[test]
    fn test_refused_event_is_rejected() {
        let err = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "events is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        match record_error(err) {
            EventError::Rejected(message) => assert_eq!(message, "events is forbidden (403)"),
            other => panic!("expected Rejected, got {:?}", other),
        }

        let err = kube::Error::ReadEvents(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        assert!(matches!(record_error(err), EventError::Kube(_)));
    }

    #[tokio::test]
    async fn test_recorder_skips_failures() {
        let sink = Arc::new(RecordingEventSink::failing_after(1));
        let recorder = EventRecorder::new(sink.clone());
        let buffer = EventBuffer::new(involved());
        buffer.publish("A", "first");
        buffer.publish("B", "second");
        buffer.publish("C", "third");

        let recorded = recorder
            .publish(&ResourceKey::new("metal", "host-0"), buffer.drain())
            .await;
        assert_eq!(recorded, 1);
        assert_eq!(sink.reasons(), vec!["A".to_string()]);
        assert_eq!(sink.attempts(), 3);
    }
}
