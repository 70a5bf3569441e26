//! Best-effort application of the storage lifetime policy.
//!
//! Providers may reject attribute changes for a short while after launch, so
//! the policy is retried a bounded number of times. Giving up is not an
//! error for the provisioning flow.

use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::provider::{CloudProvider, InstanceHandle, StoragePolicy};

/// Attempts made before the policy is abandoned.
pub const DEFAULT_STORAGE_ATTEMPTS: u32 = 5;

/// Delay between two attempts.
pub const DEFAULT_STORAGE_DELAY: Duration = Duration::from_secs(10);

/// What happened to the storage policy of one instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageOutcome {
    /// Storage persists; nothing had to be changed.
    NotRequested,
    /// The policy was applied after `attempts` tries.
    Applied {
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed; provisioning carried on regardless.
    Failed {
        /// Attempts made.
        attempts: u32,
    },
}

impl StorageOutcome {
    /// Returns `true` when the policy ended up applied.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Retries a storage policy change with a fixed delay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StorageConfigurator {
    delay: Duration,
    max_attempts: u32,
}

impl Default for StorageConfigurator {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_DELAY, DEFAULT_STORAGE_ATTEMPTS)
    }
}

impl StorageConfigurator {
    /// Creates a configurator. A zero attempt budget is treated as one.
    #[must_use]
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Applies `policy` to the instance's volumes.
    ///
    /// [`StoragePolicy::Persist`] is the provider default, so nothing is
    /// sent and the outcome is [`StorageOutcome::NotRequested`].
    /// [`StoragePolicy::DeleteOnTermination`] disables persistence with
    /// retries; intermediate errors are logged at debug level and swallowed.
    /// The returned outcome is never an error.
    pub async fn apply_policy<P: CloudProvider>(
        &self,
        provider: &P,
        handle: &InstanceHandle,
        policy: StoragePolicy,
    ) -> StorageOutcome {
        if policy == StoragePolicy::Persist {
            debug!(instance = %handle.id, "storage persists; no policy change");
            return StorageOutcome::NotRequested;
        }

        let mut attempts = 0;
        while attempts < self.max_attempts {
            attempts += 1;
            match provider.modify_storage_attribute(handle, policy).await {
                Ok(()) => return StorageOutcome::Applied { attempts },
                Err(err) => {
                    debug!(instance = %handle.id, attempts, error = %err, "storage policy rejected");
                }
            }
            if attempts < self.max_attempts {
                sleep(self.delay).await;
            }
        }

        warn!(
            instance = %handle.id,
            attempts,
            "could not mark volumes for deletion on termination; continuing"
        );
        StorageOutcome::Failed { attempts }
    }
}
