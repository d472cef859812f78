//! Data models for the provisioner client
//!
//! `HostData` is what the controller hands to the factory; the remaining
//! types mirror the subset of the Ironic REST API responses the client reads.

use crate::error::ProvisionerError;
use serde::{Deserialize, Serialize};

/// Identity of a host, without BMC credentials.
///
/// This is enough to address a node in the backend for read-only queries
/// such as the attached virtual media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostData {
    pub namespace: String,
    pub name: String,
    /// Node identifier assigned by the backend, once the host is registered
    pub provisioner_id: Option<String>,
}

impl HostData {
    /// Create host data for a namespaced host
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            provisioner_id: None,
        }
    }

    /// Attach the backend node identifier (empty values are ignored)
    #[must_use]
    pub fn with_provisioner_id(mut self, id: Option<&str>) -> Self {
        self.provisioner_id = id.filter(|id| !id.is_empty()).map(str::to_string);
        self
    }

    /// Checks the host data can address a node.
    pub fn validate(&self) -> Result<(), ProvisionerError> {
        if self.name.is_empty() {
            return Err(ProvisionerError::InvalidHostData(
                "host name is empty".to_string(),
            ));
        }
        if self.namespace.is_empty() {
            return Err(ProvisionerError::InvalidHostData(format!(
                "host {} has no namespace",
                self.name
            )));
        }
        Ok(())
    }

    /// Identifier used to look the node up in the backend.
    ///
    /// The backend UUID when known, otherwise the `<namespace>~<name>` node
    /// name the host controller registers hosts under.
    pub fn node_identifier(&self) -> String {
        match &self.provisioner_id {
            Some(id) => id.clone(),
            None => format!("{}~{}", self.namespace, self.name),
        }
    }
}

/// Node as returned by `GET /v1/nodes/{ident}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provision_state: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Response of `GET /v1/nodes/{uuid}/vmedia`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VirtualMediaList {
    #[serde(default)]
    pub vmedia: Vec<VirtualMedia>,
}

/// One virtual media device of a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMedia {
    pub device_type: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Device type data images are attached as
pub const CDROM_DEVICE: &str = "cdrom";

impl VirtualMediaList {
    /// URL of the image inserted in the first CD-ROM device, if any
    pub fn attached_cdrom_url(&self) -> Option<&str> {
        self.vmedia
            .iter()
            .filter(|m| m.device_type == CDROM_DEVICE)
            .find_map(|m| m.image_url.as_deref().filter(|u| !u.is_empty()))
    }
}
