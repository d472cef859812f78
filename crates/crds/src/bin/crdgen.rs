//! Prints the CRD manifests for the DCops data image resources as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crds.yaml`

use anyhow::Result;
use crds::{BareMetalHost, DataImage};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let docs = [
        serde_yaml::to_string(&DataImage::crd())?,
        serde_yaml::to_string(&BareMetalHost::crd())?,
    ];
    print!("{}", docs.join("---\n"));
    Ok(())
}
