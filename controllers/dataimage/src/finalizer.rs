//! Finalizer lifecycle for DataImage resources.
//!
//! The controller's marker keeps a DataImage from being removed while an image
//! may still be attached to the host. `FinalizerState` holds the pure
//! transitions; `add_finalizer` and `remove_finalizer` persist them.

use crate::store::{ResourceStore, StoreError};
use crds::{DataImage, DATA_IMAGE_FINALIZER};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum FinalizerError {
    /// Removal refused while the status still reports an attached image
    #[error("image {0} is still attached")]
    StillAttached(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Whether this controller's marker is on the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    /// No controller marker; removal is not gated
    Absent,
    /// Marker set; removal waits for the controller
    Present,
}

impl FinalizerState {
    /// State of `image` as loaded.
    pub fn of(image: &DataImage) -> Self {
        if image.has_finalizer() {
            Self::Present
        } else {
            Self::Absent
        }
    }

    /// Sets the marker. Always allowed.
    pub fn add(self) -> Self {
        Self::Present
    }

    /// Clears the marker. Refused whenever `attached_url` is non-empty.
    pub fn remove(self, attached_url: &str) -> Result<Self, FinalizerError> {
        if !attached_url.is_empty() {
            return Err(FinalizerError::StillAttached(attached_url.to_string()));
        }
        Ok(Self::Absent)
    }
}

/// Finalizer list with exactly one controller marker, other markers kept in order.
fn with_marker(finalizers: &[String], state: FinalizerState) -> Vec<String> {
    let mut out: Vec<String> = finalizers
        .iter()
        .filter(|f| f.as_str() != DATA_IMAGE_FINALIZER)
        .cloned()
        .collect();
    if state == FinalizerState::Present {
        out.push(DATA_IMAGE_FINALIZER.to_string());
    }
    out
}

async fn persist(
    store: &dyn ResourceStore,
    image: &mut DataImage,
    state: FinalizerState,
) -> Result<(), StoreError> {
    let current = image.metadata.finalizers.clone().unwrap_or_default();
    image.metadata.finalizers = Some(with_marker(&current, state));

    let stored = store.update_data_image(image).await?;
    image.metadata = stored.metadata;
    Ok(())
}

/// Adds the marker and persists the resource.
///
/// A marker that is already present is not duplicated; the write still goes out.
pub async fn add_finalizer(
    store: &dyn ResourceStore,
    image: &mut DataImage,
) -> Result<(), FinalizerError> {
    let state = FinalizerState::of(image).add();
    persist(store, image, state).await?;
    info!(
        "Added finalizer to DataImage {}/{}",
        image.metadata.namespace.as_deref().unwrap_or_default(),
        image.metadata.name.as_deref().unwrap_or_default()
    );
    Ok(())
}

/// Removes the marker and persists the resource, provided the status reports
/// no attached image.
pub async fn remove_finalizer(
    store: &dyn ResourceStore,
    image: &mut DataImage,
) -> Result<(), FinalizerError> {
    let attached = image.attached_url().unwrap_or_default().to_string();
    let state = FinalizerState::of(image).remove(&attached)?;
    persist(store, image, state).await?;
    info!(
        "Removed finalizer from DataImage {}/{}",
        image.metadata.namespace.as_deref().unwrap_or_default(),
        image.metadata.name.as_deref().unwrap_or_default()
    );
    Ok(())
}
