//! Ironic provisioner client
//!
//! Implements the provisioner traits against the Ironic REST API:
//! readiness via `GET /v1/`, node lookup via `GET /v1/nodes/{ident}` and
//! attached media via `GET /v1/nodes/{uuid}/vmedia`.

use crate::error::ProvisionerError;
use crate::models::{HostData, Node, VirtualMediaList};
use crate::provisioner_trait::{EventPublisher, Provisioner, ProvisionerFactory};
use crds::{AttachedImageReference, DataImageError, DataImageStatus};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Ironic API microversion that exposes the vmedia endpoint
const IRONIC_API_VERSION: &str = "1.89";

/// HTTP basic auth credentials for the backend
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Factory for Ironic-backed provisioners
///
/// Holds one pooled HTTP client that every per-host provisioner shares.
#[derive(Debug, Clone)]
pub struct IronicProvisionerFactory {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl IronicProvisionerFactory {
    /// Create a new factory
    ///
    /// # Arguments
    /// * `base_url` - Ironic endpoint (e.g., "http://ironic:6385")
    /// * `credentials` - Optional basic auth credentials
    pub fn new(base_url: String, credentials: Option<Credentials>) -> Result<Self, ProvisionerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ProvisionerError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ProvisionerFactory for IronicProvisionerFactory {
    fn new_provisioner(
        &self,
        host: HostData,
        publisher: EventPublisher,
    ) -> Result<Box<dyn Provisioner>, ProvisionerError> {
        host.validate()?;
        Ok(Box::new(IronicProvisioner {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            credentials: self.credentials.clone(),
            host,
            publisher,
        }))
    }
}

/// Provisioner scoped to one host's Ironic node
pub struct IronicProvisioner {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    host: HostData,
    publisher: EventPublisher,
}

impl std::fmt::Debug for IronicProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IronicProvisioner")
            .field("base_url", &self.base_url)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl IronicProvisioner {
    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-OpenStack-Ironic-API-Version", IRONIC_API_VERSION);
        match &self.credentials {
            Some(c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        }
    }

    async fn parse<T: for<'de> serde::Deserialize<'de>>(response: Response) -> Result<T, ProvisionerError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ProvisionerError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    async fn get_node(&self) -> Result<Node, ProvisionerError> {
        let ident = self.host.node_identifier();
        let response = self.get(&format!("/v1/nodes/{}", ident)).send().await?;

        match response.status() {
            s if s.is_success() => Self::parse(response).await,
            StatusCode::NOT_FOUND => Err(ProvisionerError::NotFound(format!(
                "node {} for host {}/{}",
                ident, self.host.namespace, self.host.name
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProvisionerError::Api(format!(
                    "Failed to get node {}: {} - {}",
                    ident, status, body
                )))
            }
        }
    }

    async fn get_virtual_media(&self, node: &Node) -> Result<VirtualMediaList, ProvisionerError> {
        let response = self
            .get(&format!("/v1/nodes/{}/vmedia", node.uuid))
            .send()
            .await?;

        match response.status() {
            // An empty list is the only proof that nothing is attached
            s if s.is_success() => Self::parse(response).await,
            StatusCode::NOT_FOUND => Err(ProvisionerError::NotFound(format!(
                "virtual media of node {}",
                node.uuid
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProvisionerError::Api(format!(
                    "Failed to get virtual media for node {}: {} - {}",
                    node.uuid, status, body
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl Provisioner for IronicProvisioner {
    async fn try_init(&self) -> Result<bool, ProvisionerError> {
        let response = self.get("/v1/").send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            debug!("Provisioner at {} is starting up", self.base_url);
            return Ok(false);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProvisionerError::Api(format!(
            "Readiness check failed: {} - {}",
            status, body
        )))
    }

    async fn get_data_image_status(&self) -> Result<DataImageStatus, ProvisionerError> {
        let node = self.get_node().await?;
        let media = self.get_virtual_media(&node).await?;

        let message = node.last_error.clone().unwrap_or_default();
        if !message.is_empty() {
            (self.publisher)("DataImageError", message.as_str());
        }

        Ok(DataImageStatus {
            attached_image: AttachedImageReference {
                url: media.attached_cdrom_url().unwrap_or_default().to_string(),
            },
            error: DataImageError {
                count: i32::from(!message.is_empty()),
                message,
            },
        })
    }
}
