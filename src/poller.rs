//! Bounded wait for a launched instance to reach the running state.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::provider::{CloudProvider, InstanceHandle, InstanceState};

/// Delay between two status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Status queries made before an instance is declared timed out.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 18;

/// Lifecycle status recorded for each instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Launched, not yet running.
    Pending,
    /// Reached the running state within the attempt budget.
    Running,
    /// The provider reported a terminal state other than running.
    Failed,
    /// Still pending after the attempt budget was spent. The instance is
    /// left in place at the provider.
    TimedOut,
}

impl InstanceStatus {
    /// Lower-case label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Terminal result of a poll loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollOutcome {
    /// `Running`, `Failed`, or `TimedOut`.
    pub status: InstanceStatus,
    /// Status queries issued, including the final one.
    pub attempts: u32,
    /// Provider description when the status is `Failed`.
    pub failure: Option<String>,
}

/// Polls one instance with a fixed interval and a bounded attempt count.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InstancePoller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for InstancePoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_ATTEMPTS)
    }
}

impl InstancePoller {
    /// Creates a poller. A zero attempt budget is treated as one attempt.
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Queries the provider until the instance runs, fails, or the attempt
    /// budget is exhausted.
    ///
    /// Status query errors count as an attempt and are otherwise treated as
    /// "still pending"; the instance is not failed because of a transient API
    /// hiccup.
    pub async fn wait_until_running<P: CloudProvider>(
        &self,
        provider: &P,
        handle: &InstanceHandle,
    ) -> PollOutcome {
        let mut attempts = 0;
        while attempts < self.max_attempts {
            attempts += 1;
            match provider.get_status(handle).await {
                Ok(InstanceState::Running) => {
                    return PollOutcome {
                        status: InstanceStatus::Running,
                        attempts,
                        failure: None,
                    };
                }
                Ok(InstanceState::Failed { reason }) => {
                    warn!(instance = %handle.id, %reason, "instance entered a failed state");
                    return PollOutcome {
                        status: InstanceStatus::Failed,
                        attempts,
                        failure: Some(reason),
                    };
                }
                Ok(InstanceState::Pending) => {
                    debug!(instance = %handle.id, attempts, "instance still pending");
                }
                Err(err) => {
                    warn!(instance = %handle.id, attempts, error = %err, "status query failed");
                }
            }

            if attempts < self.max_attempts {
                sleep(self.interval).await;
            }
        }

        warn!(
            instance = %handle.id,
            attempts,
            "instance did not reach running state; leaving it in place"
        );
        PollOutcome {
            status: InstanceStatus::TimedOut,
            attempts,
            failure: None,
        }
    }
}
