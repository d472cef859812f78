//! Mock provisioner for unit testing
//!
//! Scriptable stand-in for the Ironic backend. Every provisioner created by a
//! `MockProvisionerFactory` shares the factory's state, so a test can set up
//! readiness and status up front and inspect what was requested afterwards.

use crate::error::ProvisionerError;
use crate::models::HostData;
use crate::provisioner_trait::{EventPublisher, Provisioner, ProvisionerFactory};
use crds::{AttachedImageReference, DataImageStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    ready: bool,
    init_error: Option<String>,
    factory_error: Option<String>,
    status: DataImageStatus,
    status_error: Option<String>,
    events: Vec<(String, String)>,
    hosts: Vec<HostData>,
    status_calls: usize,
    status_delay: Option<Duration>,
}

/// Mock provisioner factory for testing
#[derive(Debug, Clone, Default)]
pub struct MockProvisionerFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockProvisionerFactory {
    /// Create a factory whose backend is ready and reports no attached image
    pub fn new() -> Self {
        let factory = Self::default();
        factory.set_ready(true);
        factory
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the readiness reported by `try_init`
    pub fn set_ready(&self, ready: bool) {
        self.state().ready = ready;
    }

    /// Make `try_init` fail with an API error
    pub fn fail_init(&self, message: impl Into<String>) {
        self.state().init_error = Some(message.into());
    }

    /// Make `new_provisioner` fail
    pub fn fail_factory(&self, message: impl Into<String>) {
        self.state().factory_error = Some(message.into());
    }

    /// Set the status reported by `get_data_image_status`
    pub fn set_status(&self, status: DataImageStatus) {
        self.state().status = status;
    }

    /// Convenience for a status with only the attached URL set
    pub fn set_attached_url(&self, url: impl Into<String>) {
        self.set_status(DataImageStatus {
            attached_image: AttachedImageReference { url: url.into() },
            ..Default::default()
        });
    }

    /// Make `get_data_image_status` fail
    pub fn fail_status(&self, message: impl Into<String>) {
        self.state().status_error = Some(message.into());
    }

    /// Make `get_data_image_status` wait for `delay` before answering
    pub fn stall_status(&self, delay: Duration) {
        self.state().status_delay = Some(delay);
    }

    /// Queue an event the provisioner publishes while fetching status
    pub fn publish_on_status(&self, reason: impl Into<String>, message: impl Into<String>) {
        self.state().events.push((reason.into(), message.into()));
    }

    /// Host data every provisioner was created with, in order
    pub fn hosts(&self) -> Vec<HostData> {
        self.state().hosts.clone()
    }

    /// Number of `get_data_image_status` calls
    pub fn status_calls(&self) -> usize {
        self.state().status_calls
    }
}

impl ProvisionerFactory for MockProvisionerFactory {
    fn new_provisioner(
        &self,
        host: HostData,
        publisher: EventPublisher,
    ) -> Result<Box<dyn Provisioner>, ProvisionerError> {
        let mut state = self.state();
        if let Some(message) = &state.factory_error {
            return Err(ProvisionerError::InvalidHostData(message.clone()));
        }
        state.hosts.push(host);
        Ok(Box::new(MockProvisioner {
            state: self.state.clone(),
            publisher,
        }))
    }
}

/// Provisioner handed out by `MockProvisionerFactory`
pub struct MockProvisioner {
    state: Arc<Mutex<MockState>>,
    publisher: EventPublisher,
}

impl std::fmt::Debug for MockProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvisioner").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Provisioner for MockProvisioner {
    async fn try_init(&self) -> Result<bool, ProvisionerError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &state.init_error {
            Some(message) => Err(ProvisionerError::Api(message.clone())),
            None => Ok(state.ready),
        }
    }

    async fn get_data_image_status(&self) -> Result<DataImageStatus, ProvisionerError> {
        let delay = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.status_calls += 1;
            state.status_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (result, events) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let result = match &state.status_error {
                Some(message) => Err(ProvisionerError::Api(message.clone())),
                None => Ok(state.status.clone()),
            };
            (result, state.events.clone())
        };

        for (reason, message) in &events {
            (self.publisher)(reason.as_str(), message.as_str());
        }
        result
    }
}
