//! BareMetalHost CRD
//!
//! Only the subset of the host resource the DataImage controller consumes is
//! modelled here. Unknown fields are ignored on deserialization, so the type
//! can read hosts written by the full host controller.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation marking a host as detached from provisioning management.
///
/// Presence is what matters; the value is ignored.
pub const DETACHED_ANNOTATION: &str = "baremetalhost.dcops.microscaler.io/detached";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    status = "BareMetalHostStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// Whether the host should be powered on
    #[serde(default)]
    pub online: bool,

    /// MAC address of the boot interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mac_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostStatus {
    /// Provisioning state tracked by the host controller
    #[serde(default)]
    pub provisioning: ProvisionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionStatus {
    /// Identifier of the node in the provisioning backend
    #[serde(default, rename = "ID")]
    pub id: String,

    /// Provisioning state name
    #[serde(default)]
    pub state: String,
}

impl BareMetalHost {
    /// Whether the host carries the detached annotation.
    pub fn is_detached(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(DETACHED_ANNOTATION))
    }

    /// Backend node identifier, if the host controller has registered one.
    pub fn provisioner_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.provisioning.id.as_str())
            .filter(|id| !id.is_empty())
    }
}
