//! Provisioner Client
//!
//! Client library for the bare-metal provisioning backend (Ironic).
//! The DataImage controller uses it to check backend readiness and to read
//! which image is currently attached to a host's node.
//!
//! # Example
//!
//! ```no_run
//! use provisioner_client::{HostData, IronicProvisionerFactory, ProvisionerFactory};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = IronicProvisionerFactory::new("http://ironic:6385".to_string(), None)?;
//! let prov = factory.new_provisioner(
//!     HostData::new("metal", "host-0"),
//!     Arc::new(|reason: &str, message: &str| println!("{}: {}", reason, message)),
//! )?;
//!
//! if prov.try_init().await? {
//!     let status = prov.get_data_image_status().await?;
//!     println!("attached: {}", status.attached_image.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod provisioner_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{Credentials, IronicProvisionerFactory};
pub use error::ProvisionerError;
pub use models::HostData;
pub use provisioner_trait::{EventPublisher, Provisioner, ProvisionerFactory};
#[cfg(feature = "test-util")]
pub use mock::MockProvisionerFactory;
