//! Controller configuration.
//!
//! Everything is read once from environment variables at startup. Retry
//! delays are grouped into `RetryDelays` and handed to the reconciler, which
//! only ever names which delay applies.

use crate::error::ControllerError;
use provisioner_client::Credentials;
use std::time::Duration;

const DEFAULT_PROVISIONER_URL: &str = "http://ironic.baremetal-operator-system:6385";

/// Named requeue delays used by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDelays {
    /// Standard delay after transient store/provisioner failures and while
    /// waiting for an image to detach
    pub retry: Duration,
    /// Delay while the provisioner is not ready
    pub provisioner_retry: Duration,
    /// Delay while the host is detached from provisioning
    pub unmanaged_retry: Duration,
}

impl Default for RetryDelays {
    fn default() -> Self {
        Self {
            retry: Duration::from_secs(60),
            provisioner_retry: Duration::from_secs(30),
            unmanaged_retry: Duration::from_secs(600),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch (`None` = all namespaces)
    pub namespace: Option<String>,
    pub provisioner_url: String,
    pub provisioner_credentials: Option<Credentials>,
    pub max_concurrent_reconciles: u16,
    /// Upper bound for a single reconciliation pass
    pub reconcile_timeout: Duration,
    pub debounce: Duration,
    pub delays: RetryDelays,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RetryDelays::default();
        let delays = RetryDelays {
            retry: secs(&lookup, "DATAIMAGE_RETRY_DELAY_SECS", defaults.retry)?,
            provisioner_retry: secs(&lookup, "PROVISIONER_RETRY_DELAY_SECS", defaults.provisioner_retry)?,
            unmanaged_retry: secs(&lookup, "UNMANAGED_RETRY_DELAY_SECS", defaults.unmanaged_retry)?,
        };

        let max_concurrent_reconciles = match lookup("MAX_CONCURRENT_RECONCILES") {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "MAX_CONCURRENT_RECONCILES must be a positive integer, got {:?}",
                        raw
                    )));
                }
            },
            None => 3,
        };

        let provisioner_credentials = match (lookup("PROVISIONER_USERNAME"), lookup("PROVISIONER_PASSWORD")) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(ControllerError::InvalidConfig(
                    "PROVISIONER_USERNAME and PROVISIONER_PASSWORD must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            provisioner_url: lookup("PROVISIONER_URL")
                .unwrap_or_else(|| DEFAULT_PROVISIONER_URL.to_string()),
            provisioner_credentials,
            max_concurrent_reconciles,
            reconcile_timeout: secs(&lookup, "RECONCILE_TIMEOUT_SECS", Duration::from_secs(60))?,
            debounce: secs(&lookup, "RECONCILE_DEBOUNCE_SECS", Duration::from_secs(1))?,
            delays,
        })
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
            ControllerError::InvalidConfig(format!("{} must be a number of seconds, got {:?}", key, raw))
        }),
        None => Ok(default),
    }
}
