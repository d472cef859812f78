//! Reconciliation logic for DataImage CRDs.
//!
//! One pass loads the DataImage and its correlated BareMetalHost, asks the
//! provisioner for the image currently attached to the host, and then either
//! manages the finalizer (new or deleting DataImages) or copies the observed
//! status onto the resource. The result of a pass is a `Requeue` telling the
//! dispatcher whether and when to run the key again.

use crate::backoff::BackoffTracker;
use crate::config::RetryDelays;
use crate::error::ReconcileError;
use crate::events::{EventBuffer, EventRecorder, InvolvedObject};
use crate::finalizer::{self, FinalizerError};
use crate::store::{ResourceKey, ResourceStore};
use crds::{BareMetalHost, DataImage};
use kube_runtime::controller::Action;
use provisioner_client::{HostData, ProvisionerFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the dispatcher should do with a key after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for the next watch event
    None,
    /// Run again right away
    Immediate,
    /// Run again once the delay has elapsed
    After(Duration),
}

impl Requeue {
    pub fn into_action(self) -> Action {
        match self {
            Self::None => Action::await_change(),
            Self::Immediate => Action::requeue(Duration::ZERO),
            Self::After(delay) => Action::requeue(delay),
        }
    }
}

/// State of a single pass.
pub struct ReconcileContext {
    pub key: ResourceKey,
    pub image: DataImage,
    pub host: BareMetalHost,
    pub events: EventBuffer,
}

impl ReconcileContext {
    pub fn new(key: ResourceKey, image: DataImage, host: BareMetalHost) -> Self {
        let events = EventBuffer::new(InvolvedObject::data_image(&image));
        Self {
            key,
            image,
            host,
            events,
        }
    }

    /// Host identity handed to the provisioner (no BMC credentials).
    fn host_data(&self) -> HostData {
        HostData::new(&self.key.namespace, &self.key.name)
            .with_provisioner_id(self.host.provisioner_id())
    }
}

fn finalizer_error(step: &'static str, err: FinalizerError) -> ReconcileError {
    match err {
        FinalizerError::StillAttached(url) => ReconcileError::StillAttached { step, url },
        FinalizerError::Store(e) => ReconcileError::store(step, e),
    }
}

/// Reconciles DataImage resources.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    provisioners: Arc<dyn ProvisionerFactory>,
    recorder: EventRecorder,
    delays: RetryDelays,
    backoff: BackoffTracker,
    timeout: Duration,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        provisioners: Arc<dyn ProvisionerFactory>,
        recorder: EventRecorder,
        delays: RetryDelays,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            provisioners,
            recorder,
            delays,
            backoff: BackoffTracker::new(),
            timeout,
        }
    }

    pub fn delays(&self) -> RetryDelays {
        self.delays
    }

    /// Runs one pass for `key` bounded by the configured timeout.
    ///
    /// A successful pass resets the key's default backoff.
    pub async fn run(&self, key: &ResourceKey) -> Result<Requeue, ReconcileError> {
        match tokio::time::timeout(self.timeout, self.reconcile(key)).await {
            Ok(Ok(requeue)) => {
                self.backoff.reset(&key.to_string());
                Ok(requeue)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ReconcileError::Timeout(self.timeout)),
        }
    }

    /// Reconciles the DataImage identified by `key`.
    ///
    /// This method:
    /// 1. Loads the DataImage and the BareMetalHost with the same key
    /// 2. Skips hosts detached from provisioning
    /// 3. Waits for the provisioner to become ready
    /// 4. Adds the finalizer to new DataImages
    /// 5. Fetches the attached image status from the provisioner
    /// 6. Removes the finalizer of a deleting DataImage once nothing is attached,
    ///    or writes the status and publishes buffered events otherwise
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue, ReconcileError> {
        info!("Reconciling DataImage {}", key);

        let Some(image) = self
            .store
            .get_data_image(key)
            .await
            .map_err(|e| ReconcileError::store("load DataImage", e))?
        else {
            info!("DataImage {} not found", key);
            return Ok(Requeue::None);
        };

        let Some(host) = self
            .store
            .get_host(key)
            .await
            .map_err(|e| ReconcileError::store("load BareMetalHost", e))?
        else {
            info!("BareMetalHost not found for DataImage {}", key);
            return Ok(Requeue::None);
        };

        if host.is_detached() {
            info!("BareMetalHost {} is detached, not reconciling DataImage", key);
            return Ok(Requeue::After(self.delays.unmanaged_retry));
        }

        let mut ctx = ReconcileContext::new(key.clone(), image, host);

        let provisioner = self
            .provisioners
            .new_provisioner(ctx.host_data(), ctx.events.publisher())
            .map_err(ReconcileError::ProvisionerHandle)?;

        match provisioner.try_init().await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    "Provisioner is not ready for DataImage {}: not ready, requeue after {:?}",
                    key, self.delays.provisioner_retry
                );
                return Ok(Requeue::After(self.delays.provisioner_retry));
            }
            Err(e) => {
                info!(
                    "Provisioner is not ready for DataImage {}: {}, requeue after {:?}",
                    key, e, self.delays.provisioner_retry
                );
                return Ok(Requeue::After(self.delays.provisioner_retry));
            }
        }

        let deleting = ctx.image.is_deleting();

        if !deleting && !ctx.image.has_finalizer() {
            finalizer::add_finalizer(self.store.as_ref(), &mut ctx.image)
                .await
                .map_err(|e| finalizer_error("add finalizer", e))?;
            return Ok(Requeue::Immediate);
        }

        let status = provisioner
            .get_data_image_status()
            .await
            .map_err(|source| ReconcileError::ProvisionerUnavailable {
                step: "get latest status",
                source,
            })?;

        let previous_url = ctx.image.attached_url().unwrap_or_default().to_string();
        ctx.image.status = Some(status);
        let current_url = ctx.image.attached_url().unwrap_or_default().to_string();

        if deleting {
            info!("Cleaning up deleted DataImage {}", key);
            if !current_url.is_empty() {
                info!(
                    "Waiting for image {} to detach from {} before removing finalizer",
                    current_url, key
                );
                return Ok(Requeue::After(self.delays.retry));
            }

            finalizer::remove_finalizer(self.store.as_ref(), &mut ctx.image)
                .await
                .map_err(|e| finalizer_error("remove finalizer", e))?;
            return Ok(Requeue::None);
        }

        if current_url != previous_url {
            if current_url.is_empty() {
                ctx.events
                    .publish("ImageDetached", &format!("Image {} detached", previous_url));
            } else {
                ctx.events
                    .publish("ImageAttached", &format!("Image {} attached", current_url));
            }
        }

        self.store
            .update_data_image_status(&ctx.image)
            .await
            .map_err(|e| ReconcileError::store("update status", e))?;
        debug!("Updated DataImage {} status: {:?}", key, ctx.image.status);

        let events = ctx.events.drain();
        if !events.is_empty() {
            let total = events.len();
            let recorded = self.recorder.publish(key, events).await;
            debug!("Recorded {}/{} events for DataImage {}", recorded, total, key);
        }

        Ok(Requeue::None)
    }

    /// Maps a failed pass to the dispatcher's next action.
    pub fn requeue_for_error(&self, key: &ResourceKey, err: &ReconcileError) -> Requeue {
        match err {
            ReconcileError::StoreUnavailable { .. }
            | ReconcileError::ProvisionerUnavailable { .. }
            | ReconcileError::StillAttached { .. }
            | ReconcileError::Timeout(_) => Requeue::After(self.delays.retry),
            ReconcileError::PersistConflict { .. } => Requeue::Immediate,
            ReconcileError::ProvisionerHandle(_) => {
                let delay = self.backoff.next(&key.to_string());
                warn!("Backing off DataImage {} for {:?}", key, delay);
                Requeue::After(delay)
            }
        }
    }
}
