//! Integration tests for the provisioner client
//!
//! These tests require a running Ironic instance.
//! Set PROVISIONER_URL (and PROVISIONER_NODE for the status test) to run.

use provisioner_client::{HostData, IronicProvisionerFactory, ProvisionerFactory};
use std::sync::Arc;

fn factory() -> IronicProvisionerFactory {
    let url = std::env::var("PROVISIONER_URL")
        .unwrap_or_else(|_| "http://localhost:6385".to_string());
    IronicProvisionerFactory::new(url, None).expect("Failed to create factory")
}

#[tokio::test]
#[ignore] // Requires running Ironic instance
async fn test_backend_ready() {
    let prov = factory()
        .new_provisioner(HostData::new("metal", "host-0"), Arc::new(|_: &str, _: &str| {}))
        .expect("Failed to create provisioner");

    let ready = prov.try_init().await.expect("Readiness check failed");
    assert!(ready, "Backend should be ready");
}

#[tokio::test]
#[ignore] // Requires running Ironic instance with a registered node
async fn test_data_image_status() {
    let node = std::env::var("PROVISIONER_NODE")
        .expect("PROVISIONER_NODE environment variable must be set");
    let host = HostData::new("metal", "host-0").with_provisioner_id(Some(&node));
    let prov = factory()
        .new_provisioner(host, Arc::new(|reason: &str, message: &str| {
            println!("event {}: {}", reason, message);
        }))
        .expect("Failed to create provisioner");

    let status = prov.get_data_image_status().await.expect("Failed to get status");
    println!("Attached image: {:?}", status.attached_image.url);
}
