//! Main controller implementation.
//!
//! Wires the Kubernetes client, the provisioner client and the reconciler
//! together and runs the DataImage watcher on its own task.

use crate::config::Config;
use crate::error::ControllerError;
use crate::events::{EventRecorder, KubeEventSink};
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::Watcher;
use crds::{BareMetalHost, DataImage};
use kube::{Api, Client};
use provisioner_client::IronicProvisionerFactory;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, error};

/// Main controller for DataImage resources.
pub struct Controller {
    data_image_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing DataImage Controller");

        let kube_client = Client::try_default().await?;

        let (data_image_api, host_api): (Api<DataImage>, Api<BareMetalHost>) = match &config.namespace {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client.clone())),
        };

        let provisioners = IronicProvisionerFactory::new(
            config.provisioner_url.clone(),
            config.provisioner_credentials.clone(),
        )?;
        info!("Using provisioner at {}", provisioners.base_url());

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeStore::new(kube_client.clone())),
            Arc::new(provisioners),
            EventRecorder::new(Arc::new(KubeEventSink::new(kube_client))),
            config.delays,
            config.reconcile_timeout,
        ));

        let watcher = Watcher::new(
            reconciler,
            data_image_api,
            host_api,
            config.max_concurrent_reconciles,
            config.debounce,
        );
        let data_image_watcher = tokio::spawn(watcher.watch_data_images());

        Ok(Self { data_image_watcher })
    }

    /// Waits for the watcher to finish.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("DataImage Controller running");

        match self.data_image_watcher.await {
            Ok(result) => result,
            Err(e) => {
                error!("DataImage watcher task failed: {}", e);
                Err(ControllerError::Watch(format!("DataImage watcher task failed: {}", e)))
            }
        }
    }
}
