//! Kubernetes resource watchers.
//!
//! DataImages are reconciled through `kube_runtime::Controller`, which gives
//! per-key exclusivity, coalescing of queued events, bounded concurrency and
//! graceful shutdown. BareMetalHost changes are mapped onto the DataImage with
//! the same namespace/name, filtered by `HostGenerationFilter`.

use crate::error::{ControllerError, ReconcileError};
use crate::reconciler::{Reconciler, Requeue};
use crate::store::ResourceKey;
use crate::trigger::HostGenerationFilter;
use crds::{BareMetalHost, DataImage};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher, controller::{Action, Config as ControllerConfig}};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, error, debug};

async fn reconcile(image: Arc<DataImage>, ctx: Arc<Reconciler>) -> Result<Action, ReconcileError> {
    let key = ResourceKey::from_resource(image.as_ref());
    let requeue = ctx.run(&key).await?;
    debug!("DataImage {} reconciled, requeue: {:?}", key, requeue);
    Ok(requeue.into_action())
}

fn error_policy(image: Arc<DataImage>, error: &ReconcileError, ctx: Arc<Reconciler>) -> Action {
    let key = ResourceKey::from_resource(image.as_ref());
    let requeue = ctx.requeue_for_error(&key, error);
    error!("Reconciliation error for DataImage {}: {} (requeue: {:?})", key, error, requeue);
    requeue.into_action()
}

/// Watches DataImages and their hosts.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    data_image_api: Api<DataImage>,
    host_api: Api<BareMetalHost>,
    concurrency: u16,
    debounce: Duration,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        data_image_api: Api<DataImage>,
        host_api: Api<BareMetalHost>,
        concurrency: u16,
        debounce: Duration,
    ) -> Self {
        Self {
            reconciler,
            data_image_api,
            host_api,
            concurrency,
            debounce,
        }
    }

    /// Runs the DataImage controller loop until a shutdown signal arrives.
    pub async fn watch_data_images(self) -> Result<(), ControllerError> {
        info!(
            "Starting DataImage watcher (concurrency {}, retry delays {:?})",
            self.concurrency,
            self.reconciler.delays()
        );

        let filter = Arc::new(HostGenerationFilter::new());
        let host_mapper = move |host: BareMetalHost| {
            filter.should_trigger(&host).then(|| {
                ObjectRef::<DataImage>::new(&host.name_any())
                    .within(&host.namespace().unwrap_or_default())
            })
        };

        let controller_config = ControllerConfig::default()
            .debounce(self.debounce)
            .concurrency(self.concurrency);

        Controller::new(self.data_image_api, watcher::Config::default())
            .with_config(controller_config)
            .watches(self.host_api, watcher::Config::default(), host_mapper)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled DataImage {}", obj),
                    Err(e) => error!("Controller error for DataImage: {}", e),
                }
            })
            .await;

        info!("DataImage watcher stopped");
        Ok(())
    }
}
