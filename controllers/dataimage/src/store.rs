//! Access to persisted DataImage and BareMetalHost objects.
//!
//! The reconciler only talks to the cluster through `ResourceStore`, which
//! keeps it testable against the in-memory store in `test_utils`.

use async_trait::async_trait;
use crds::{BareMetalHost, DataImage};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Namespace/name identity shared by a DataImage and its host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object (cluster-scoped objects get an empty namespace).
    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.meta().namespace.clone().unwrap_or_default(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Errors from the persisted-object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The object was modified since it was read
    #[error("object {0} was modified concurrently")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }
}

/// Read and write operations the reconciler needs.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// `Ok(None)` when the DataImage does not exist.
    async fn get_data_image(&self, key: &ResourceKey) -> Result<Option<DataImage>, StoreError>;

    /// `Ok(None)` when the host does not exist.
    async fn get_host(&self, key: &ResourceKey) -> Result<Option<BareMetalHost>, StoreError>;

    /// Persists the finalizer list of `image`, conditional on its
    /// resourceVersion. Returns the stored object.
    async fn update_data_image(&self, image: &DataImage) -> Result<DataImage, StoreError>;

    /// Persists `image.status` through the status subresource.
    async fn update_data_image_status(&self, image: &DataImage) -> Result<DataImage, StoreError>;
}

/// `ResourceStore` backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn data_images(&self, namespace: &str) -> Api<DataImage> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn hosts(&self, namespace: &str) -> Api<BareMetalHost> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// 409 becomes `Conflict`; failures that never reached the API server become
/// `Unavailable`.
fn classify(key: &ResourceKey, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ref resp) if resp.code == 409 => StoreError::Conflict(key.to_string()),
        kube::Error::Api(_) | kube::Error::SerdeError(_) => StoreError::Kube(err),
        other => StoreError::Unavailable(format!("{}: {}", key, other)),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_data_image(&self, key: &ResourceKey) -> Result<Option<DataImage>, StoreError> {
        self.data_images(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| classify(key, e))
    }

    async fn get_host(&self, key: &ResourceKey) -> Result<Option<BareMetalHost>, StoreError> {
        self.hosts(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| classify(key, e))
    }

    async fn update_data_image(&self, image: &DataImage) -> Result<DataImage, StoreError> {
        let key = ResourceKey::from_resource(image);
        let patch = json!({
            "metadata": {
                "finalizers": image.finalizers(),
                "resourceVersion": image.resource_version(),
            }
        });
        debug!("Patching finalizers of DataImage {}: {:?}", key, image.finalizers());

        self.data_images(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(&key, e))
    }

    async fn update_data_image_status(&self, image: &DataImage) -> Result<DataImage, StoreError> {
        let key = ResourceKey::from_resource(image);
        let patch = json!({
            "status": serde_json::to_value(image.status.clone().unwrap_or_default())?
        });

        self.data_images(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(&key, e))
    }
}
