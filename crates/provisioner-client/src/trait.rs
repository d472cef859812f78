//! Provisioner traits for mocking
//!
//! The controller only ever talks to the backend through these traits, so
//! tests can swap in `MockProvisionerFactory` without a running backend.

use crate::error::ProvisionerError;
use crate::models::HostData;
use crds::DataImageStatus;
use std::sync::Arc;

/// Callback a provisioner uses to report audit events `(reason, message)`.
///
/// Events are buffered by the caller and only persisted after the
/// reconciliation pass has written its status.
pub type EventPublisher = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Builds provisioner handles scoped to one host
pub trait ProvisionerFactory: Send + Sync {
    /// Create a provisioner for `host`. Fails when the host data cannot
    /// address a backend node.
    fn new_provisioner(
        &self,
        host: HostData,
        publisher: EventPublisher,
    ) -> Result<Box<dyn Provisioner>, ProvisionerError>;
}

/// Operations on a single host's backend node
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    /// Whether the backend is initialized and able to serve requests.
    ///
    /// `Ok(false)` means "not ready yet" and is not an error.
    async fn try_init(&self) -> Result<bool, ProvisionerError>;

    /// Current data image status of the host's node
    async fn get_data_image_status(&self) -> Result<DataImageStatus, ProvisionerError>;
}
