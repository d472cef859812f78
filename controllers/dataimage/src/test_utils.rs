//! Test utilities for unit testing the reconciler
//!
//! In-memory stand-ins for the Kubernetes store and the event sink, plus
//! builders for test resources.

use crate::config::RetryDelays;
use crate::events::{AuditEvent, EventError, EventRecorder, EventSink};
use crate::reconciler::Reconciler;
use crate::store::{ResourceKey, ResourceStore, StoreError};
use async_trait::async_trait;
use crds::{
    AttachedImageReference, BareMetalHost, BareMetalHostSpec, BareMetalHostStatus, DataImage,
    DataImageSpec, DataImageStatus, DETACHED_ANNOTATION, ProvisionStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use provisioner_client::MockProvisionerFactory;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct StoreState {
    data_images: HashMap<ResourceKey, DataImage>,
    hosts: HashMap<ResourceKey, BareMetalHost>,
    version: u64,
    finalizer_writes: usize,
    status_writes: usize,
    data_image_read_error: Option<String>,
    host_read_error: Option<String>,
    write_error: Option<String>,
    conflict_next_write: bool,
}

impl StoreState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// In-memory `ResourceStore` with resourceVersion checks on finalizer writes.
///
/// A deleting DataImage whose last finalizer is removed disappears from the
/// store, as it would from the cluster.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn insert_data_image(&self, mut image: DataImage) {
        let mut state = self.state();
        image.metadata.resource_version = Some(state.next_version());
        state.data_images.insert(ResourceKey::from_resource(&image), image);
    }

    pub fn insert_host(&self, host: BareMetalHost) {
        self.state().hosts.insert(ResourceKey::from_resource(&host), host);
    }

    pub fn data_image(&self, key: &ResourceKey) -> Option<DataImage> {
        self.state().data_images.get(key).cloned()
    }

    pub fn finalizer_writes(&self) -> usize {
        self.state().finalizer_writes
    }

    pub fn status_writes(&self) -> usize {
        self.state().status_writes
    }

    pub fn fail_data_image_reads(&self, message: &str) {
        self.state().data_image_read_error = Some(message.to_string());
    }

    pub fn fail_host_reads(&self, message: &str) {
        self.state().host_read_error = Some(message.to_string());
    }

    pub fn fail_writes(&self, message: &str) {
        self.state().write_error = Some(message.to_string());
    }

    /// The next write fails as if someone else updated the object first.
    pub fn conflict_on_next_write(&self) {
        self.state().conflict_next_write = true;
    }

    fn check_write(state: &mut StoreState, key: &ResourceKey) -> Result<(), StoreError> {
        if let Some(message) = &state.write_error {
            return Err(StoreError::Unavailable(message.clone()));
        }
        if std::mem::take(&mut state.conflict_next_write) {
            return Err(StoreError::Conflict(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MockStore {
    async fn get_data_image(&self, key: &ResourceKey) -> Result<Option<DataImage>, StoreError> {
        let state = self.state();
        if let Some(message) = &state.data_image_read_error {
            return Err(StoreError::Unavailable(message.clone()));
        }
        Ok(state.data_images.get(key).cloned())
    }

    async fn get_host(&self, key: &ResourceKey) -> Result<Option<BareMetalHost>, StoreError> {
        let state = self.state();
        if let Some(message) = &state.host_read_error {
            return Err(StoreError::Unavailable(message.clone()));
        }
        Ok(state.hosts.get(key).cloned())
    }

    async fn update_data_image(&self, image: &DataImage) -> Result<DataImage, StoreError> {
        let key = ResourceKey::from_resource(image);
        let mut state = self.state();
        Self::check_write(&mut state, &key)?;

        let Some(stored) = state.data_images.get(&key).cloned() else {
            return Err(StoreError::Unavailable(format!("{} not found", key)));
        };
        if stored.metadata.resource_version != image.metadata.resource_version {
            return Err(StoreError::Conflict(key.to_string()));
        }

        let mut updated = stored;
        updated.metadata.finalizers = image.metadata.finalizers.clone();
        updated.metadata.resource_version = Some(state.next_version());
        state.finalizer_writes += 1;

        let removed = updated.metadata.deletion_timestamp.is_some()
            && updated.metadata.finalizers.as_ref().is_none_or(Vec::is_empty);
        if removed {
            state.data_images.remove(&key);
        } else {
            state.data_images.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_data_image_status(&self, image: &DataImage) -> Result<DataImage, StoreError> {
        let key = ResourceKey::from_resource(image);
        let mut state = self.state();
        Self::check_write(&mut state, &key)?;

        let Some(mut updated) = state.data_images.get(&key).cloned() else {
            return Err(StoreError::Unavailable(format!("{} not found", key)));
        };
        updated.status = image.status.clone();
        updated.metadata.resource_version = Some(state.next_version());
        state.status_writes += 1;
        state.data_images.insert(key, updated.clone());
        Ok(updated)
    }
}

/// Event sink that keeps what it was given.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    recorded: Mutex<Vec<AuditEvent>>,
    attempts: Mutex<usize>,
    accept: Option<usize>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts the first `n` events and rejects every later one.
    pub fn failing_after(n: usize) -> Self {
        Self {
            accept: Some(n),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), EventError> {
        *self.attempts.lock().unwrap() += 1;
        let mut recorded = self.recorded.lock().unwrap();
        if self.accept.is_some_and(|n| recorded.len() >= n) {
            return Err(EventError::Rejected(event.reason.clone()));
        }
        recorded.push(event.clone());
        Ok(())
    }
}

/// Helper to create a test DataImage with the given finalizers
pub fn create_test_data_image(namespace: &str, name: &str, finalizers: &[&str]) -> DataImage {
    DataImage {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{}", name)),
            finalizers: (!finalizers.is_empty())
                .then(|| finalizers.iter().map(|f| f.to_string()).collect()),
            ..Default::default()
        },
        spec: DataImageSpec {
            url: format!("http://images/{}.iso", name),
        },
        status: None,
    }
}

/// Sets the attached URL recorded in the DataImage status
pub fn with_attached_url(mut image: DataImage, url: &str) -> DataImage {
    image.status = Some(DataImageStatus {
        attached_image: AttachedImageReference { url: url.to_string() },
        ..Default::default()
    });
    image
}

/// Marks the DataImage as requested for deletion
pub fn deleting(mut image: DataImage) -> DataImage {
    image.metadata.deletion_timestamp = Some(Time(Default::default()));
    image
}

/// Helper to create a test BareMetalHost at the given generation
pub fn create_test_host(namespace: &str, name: &str, generation: i64) -> BareMetalHost {
    BareMetalHost {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(generation),
            ..Default::default()
        },
        spec: BareMetalHostSpec {
            online: true,
            ..Default::default()
        },
        status: None,
    }
}

/// Adds the detached annotation to a host
pub fn detached(mut host: BareMetalHost) -> BareMetalHost {
    host.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(DETACHED_ANNOTATION.to_string(), "true".to_string());
    host
}

/// Records the backend node id on a host
pub fn with_provisioner_id(mut host: BareMetalHost, id: &str) -> BareMetalHost {
    host.status = Some(BareMetalHostStatus {
        provisioning: ProvisionStatus {
            id: id.to_string(),
            state: "provisioned".to_string(),
        },
    });
    host
}

/// Distinct delays so tests can tell which one applied
pub fn test_delays() -> RetryDelays {
    RetryDelays {
        retry: Duration::from_secs(60),
        provisioner_retry: Duration::from_secs(30),
        unmanaged_retry: Duration::from_secs(600),
    }
}

/// Reconciler wired to in-memory collaborators
pub fn create_test_reconciler(
    store: &MockStore,
    provisioners: &MockProvisionerFactory,
    sink: &Arc<RecordingEventSink>,
) -> Reconciler {
    Reconciler::new(
        Arc::new(store.clone()),
        Arc::new(provisioners.clone()),
        EventRecorder::new(sink.clone()),
        test_delays(),
        Duration::from_secs(5),
    )
}
