//! DCops CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed and reconciled by the
//! DataImage controller.

pub mod bare_metal_host;
pub mod data_image;

pub use bare_metal_host::*;
pub use data_image::*;
