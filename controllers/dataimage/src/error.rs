//! Controller-specific error types.
//!
//! `ControllerError` covers startup and watch failures. `ReconcileError` is
//! what a single reconciliation pass returns; its variant decides how the
//! dispatcher requeues the resource (see `Reconciler::requeue_for_error`).

use crate::store::StoreError;
use provisioner_client::ProvisionerError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the DataImage Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Provisioner client setup error
    #[error("Provisioner error: {0}")]
    Provisioner(#[from] ProvisionerError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Errors returned by a reconciliation pass.
///
/// Each variant names the step that produced it.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Loading or persisting an object failed (transient)
    #[error("could not {step}: {source}")]
    StoreUnavailable {
        step: &'static str,
        source: StoreError,
    },

    /// The object changed underneath us; re-run from a fresh load
    #[error("conflict while trying to {step}: {source}")]
    PersistConflict {
        step: &'static str,
        source: StoreError,
    },

    /// Provisioner call failed (transient)
    #[error("failed to {step}: {source}")]
    ProvisionerUnavailable {
        step: &'static str,
        source: ProvisionerError,
    },

    /// The provisioner handle could not be built (fatal for this pass)
    #[error("failed to create provisioner: {0}")]
    ProvisionerHandle(#[source] ProvisionerError),

    /// Finalizer removal refused while an image is attached
    #[error("cannot {step}: image {url} is still attached")]
    StillAttached { step: &'static str, url: String },

    /// The pass did not complete within its time bound
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    /// Wraps a store error, separating optimistic-concurrency conflicts.
    pub fn store(step: &'static str, source: StoreError) -> Self {
        if source.is_conflict() {
            Self::PersistConflict { step, source }
        } else {
            Self::StoreUnavailable { step, source }
        }
    }
}
