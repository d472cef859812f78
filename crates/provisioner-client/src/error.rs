//! Provisioner client errors

use thiserror::Error;

/// Errors that can occur when talking to the provisioning backend
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an unexpected response
    #[error("Provisioner API error: {0}")]
    Api(String),

    /// Node not registered in the backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// Host data cannot address a backend node
    #[error("Invalid host data: {0}")]
    InvalidHostData(String),
}
