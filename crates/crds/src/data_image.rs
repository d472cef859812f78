//! DataImage CRD
//!
//! Declares an image that should be attached to the correlated
//! `BareMetalHost` (same namespace and name) as virtual media.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer marker owned by the DataImage controller.
///
/// While present, the DataImage cannot be removed from the cluster. It is only
/// cleared once the provisioner reports that no image is attached anymore.
pub const DATA_IMAGE_FINALIZER: &str = "dataimage.dcops.microscaler.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "DataImage",
    namespaced,
    status = "DataImageStatus",
    printcolumn = r#"{"name":"Attached", "type":"string", "jsonPath":".status.attachedImage.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataImageSpec {
    /// URL of the image to attach
    pub url: String,
}

/// Observed state of a DataImage, as reported by the provisioner.
///
/// The controller copies this verbatim from the backend on every pass, so it
/// deliberately carries no timestamps: writing the same backend state twice
/// must produce the same object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataImageStatus {
    /// Image currently attached to the host (empty URL when none)
    #[serde(default)]
    pub attached_image: AttachedImageReference,

    /// Last error reported by the provisioner for this image
    #[serde(default)]
    pub error: DataImageError,
}

impl DataImageStatus {
    /// Returns the attached image URL, or `None` when nothing is attached.
    pub fn attached_url(&self) -> Option<&str> {
        let url = self.attached_image.url.as_str();
        (!url.is_empty()).then_some(url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedImageReference {
    /// URL of the attached image
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataImageError {
    /// Number of consecutive attach/detach failures
    #[serde(default)]
    pub count: i32,

    /// Last failure message
    #[serde(default)]
    pub message: String,
}

impl DataImage {
    /// Whether deletion has been requested (deletionTimestamp is set).
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the controller's finalizer marker is present.
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|m| m == DATA_IMAGE_FINALIZER))
    }

    /// Attached image URL recorded in status, if any.
    pub fn attached_url(&self) -> Option<&str> {
        self.status.as_ref().and_then(DataImageStatus::attached_url)
    }
}
