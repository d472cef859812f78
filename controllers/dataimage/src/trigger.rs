//! Host-side trigger filtering.
//!
//! A DataImage is re-reconciled when its host changes spec (generation bump),
//! not on every host status update.

use crate::store::ResourceKey;
use crds::BareMetalHost;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Whether an update moved the object's generation.
pub fn generation_changed(old: Option<i64>, new: Option<i64>) -> bool {
    old != new
}

/// Last observed incarnation of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SeenHost {
    uid: Option<String>,
    generation: Option<i64>,
}

/// Remembers the last generation seen per host.
///
/// The first sighting of a host counts as a change, so a DataImage waiting for
/// its host is picked up when the host appears. A host recreated under the
/// same name has a new UID and counts as a first sighting too.
#[derive(Debug, Default)]
pub struct HostGenerationFilter {
    seen: Mutex<HashMap<ResourceKey, SeenHost>>,
}

impl HostGenerationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_trigger(&self, host: &BareMetalHost) -> bool {
        let key = ResourceKey::from_resource(host);
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        if host.metadata.deletion_timestamp.is_some() {
            seen.remove(&key);
            return true;
        }

        let current = SeenHost {
            uid: host.metadata.uid.clone(),
            generation: host.metadata.generation,
        };
        let changed = match seen.insert(key.clone(), current.clone()) {
            Some(previous) if previous.uid == current.uid => {
                generation_changed(previous.generation, current.generation)
            }
            _ => true,
        };
        if !changed {
            debug!("Ignoring BareMetalHost {} update without generation change", key);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_host;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    #[test]
    fn test_generation_changed() {
        assert!(!generation_changed(Some(3), Some(3)));
        assert!(generation_changed(Some(3), Some(4)));
        assert!(generation_changed(None, Some(1)));
    }

    #[test]
    fn test_first_sighting_triggers() {
        let filter = HostGenerationFilter::new();
        assert!(filter.should_trigger(&create_test_host("metal", "host-0", 1)));
    }

    #[test]
    fn test_status_churn_does_not_trigger() {
        let filter = HostGenerationFilter::new();
        let mut host = create_test_host("metal", "host-0", 1);
        assert!(filter.should_trigger(&host));

        host.status.get_or_insert_with(Default::default).provisioning.state = "inspecting".to_string();
        assert!(!filter.should_trigger(&host));
        assert!(!filter.should_trigger(&host));

        host.metadata.generation = Some(2);
        assert!(filter.should_trigger(&host));
    }

    #[test]
    fn test_hosts_tracked_independently() {
        let filter = HostGenerationFilter::new();
        assert!(filter.should_trigger(&create_test_host("metal", "host-0", 1)));
        assert!(filter.should_trigger(&create_test_host("metal", "host-1", 1)));
        assert!(!filter.should_trigger(&create_test_host("metal", "host-0", 1)));
    }

    #[test]
    fn test_recreated_host_triggers() {
        let filter = HostGenerationFilter::new();
        let mut host = create_test_host("metal", "host-0", 1);
        host.metadata.uid = Some("uid-old".to_string());
        assert!(filter.should_trigger(&host));
        assert!(!filter.should_trigger(&host));

        // Deleted without a deletionTimestamp ever being observed, then recreated
        host.metadata.uid = Some("uid-new".to_string());
        assert!(filter.should_trigger(&host));
        assert!(!filter.should_trigger(&host));
    }

    #[test]
    fn test_deletion_forgets_host() {
        let filter = HostGenerationFilter::new();
        let mut host = create_test_host("metal", "host-0", 1);
        assert!(filter.should_trigger(&host));

        host.metadata.deletion_timestamp = Some(Time(Default::default()));
        assert!(filter.should_trigger(&host));

        host.metadata.deletion_timestamp = None;
        assert!(filter.should_trigger(&host));
    }
}
