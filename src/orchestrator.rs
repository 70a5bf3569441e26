//! Drives a launched batch through polling, storage policy, naming, and
//! bootstrap dispatch.
//!
//! The batch is requested in one provider call. Each returned instance is
//! then handled on its own: a timeout or failure is recorded in that
//! instance's result and never aborts its siblings. Only a failed launch or
//! a failing bootstrap hook ends the call with an error.

use std::net::IpAddr;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::bootstrap::{BootstrapError, BootstrapFuture, BootstrapHook, BootstrapTarget};
use crate::config::{Settings, Timing};
use crate::hostname;
use crate::poller::{InstancePoller, InstanceStatus};
use crate::provider::{CloudProvider, InstanceAddresses, InstanceHandle};
use crate::request::{ProvisionRequest, RequestError};
use crate::storage::{StorageConfigurator, StorageOutcome};

/// Tag key that carries the assigned hostname.
pub const NAME_TAG: &str = "Name";

/// Errors that abort a provisioning call.
#[derive(Debug, Error)]
pub enum ProvisionError<ProviderError>
where
    ProviderError: std::error::Error + 'static,
{
    /// Raised when the request fails validation before launch.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// Raised when the batch launch fails. No instance was processed.
    #[error("failed to launch instances: {0}")]
    Launch(#[source] ProviderError),
    /// Raised when the bootstrap hook fails for an instance.
    #[error("bootstrap failed for {hostname}: {source}")]
    Bootstrap {
        /// Hostname handed to the hook.
        hostname: String,
        /// Error returned by the hook.
        #[source]
        source: BootstrapError,
    },
}

/// Per-instance outcome, in batch order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceResult {
    /// Provider identifier of the instance.
    pub provider_id: String,
    /// Zone the instance lives in.
    pub zone: String,
    /// Hostname index (`seed + offset`).
    pub index: i64,
    /// Assigned hostname, when a template was given.
    pub name: Option<String>,
    /// Terminal lifecycle status.
    pub status: InstanceStatus,
    /// Public address, populated once running.
    pub public_ip: Option<IpAddr>,
    /// Private address, populated once running.
    pub private_ip: Option<IpAddr>,
    /// Status queries spent by the poller.
    pub attempts: u32,
    /// Storage policy outcome.
    pub storage: StorageOutcome,
    /// Whether the hostname tag was written.
    pub tagged: bool,
    /// Whether the bootstrap hook ran.
    pub bootstrapped: bool,
    /// Provider description of a failed state.
    pub failure: Option<String>,
}

/// Mutable view of one instance, owned by its lifecycle.
#[derive(Debug)]
struct InstanceRecord {
    handle: InstanceHandle,
    index: i64,
    assigned_name: Option<String>,
    status: InstanceStatus,
    addresses: InstanceAddresses,
    attempts: u32,
    storage: StorageOutcome,
    tagged: bool,
    bootstrapped: bool,
    failure: Option<String>,
}

impl InstanceRecord {
    fn new(handle: InstanceHandle, request: &ProvisionRequest, offset: u32) -> Self {
        Self {
            handle,
            index: request.seed.saturating_add(i64::from(offset)),
            assigned_name: hostname::assign(request.name_template.as_deref(), request.seed, offset),
            status: InstanceStatus::Pending,
            addresses: InstanceAddresses::default(),
            attempts: 0,
            storage: StorageOutcome::NotRequested,
            tagged: false,
            bootstrapped: false,
            failure: None,
        }
    }

    fn into_result(self) -> InstanceResult {
        InstanceResult {
            provider_id: self.handle.id,
            zone: self.handle.zone,
            index: self.index,
            name: self.assigned_name,
            status: self.status,
            public_ip: self.addresses.public_ip,
            private_ip: self.addresses.private_ip,
            attempts: self.attempts,
            storage: self.storage,
            tagged: self.tagged,
            bootstrapped: self.bootstrapped,
            failure: self.failure,
        }
    }
}

/// Placeholder hook for orchestrators built without bootstrap support.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBootstrap;

impl BootstrapHook for NoBootstrap {
    fn bootstrap<'a>(&'a self, _target: &'a BootstrapTarget) -> BootstrapFuture<'a> {
        Box::pin(futures::future::ready(Ok(())))
    }
}

/// Provisions batches of instances through a [`CloudProvider`].
#[derive(Debug)]
pub struct ProvisionOrchestrator<P, H = NoBootstrap> {
    provider: P,
    hook: Option<H>,
    poller: InstancePoller,
    storage: StorageConfigurator,
    max_parallel: usize,
}

impl<P: CloudProvider> ProvisionOrchestrator<P, NoBootstrap> {
    /// Creates a sequential orchestrator with default budgets and no hook.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            hook: None,
            poller: InstancePoller::default(),
            storage: StorageConfigurator::default(),
            max_parallel: 1,
        }
    }

    /// Creates an orchestrator using the budgets and pool size in `settings`.
    #[must_use]
    pub fn from_settings(provider: P, settings: &Settings) -> Self {
        Self::new(provider)
            .with_timing(&settings.timing)
            .with_max_parallel(settings.max_parallel)
    }
}

impl<P, H> ProvisionOrchestrator<P, H>
where
    P: CloudProvider,
    H: BootstrapHook,
{
    /// Installs the bootstrap hook.
    #[must_use]
    pub fn with_bootstrap<Hook: BootstrapHook>(self, hook: Hook) -> ProvisionOrchestrator<P, Hook> {
        self.with_optional_bootstrap(Some(hook))
    }

    /// Installs the bootstrap hook when one is given. `None` selects the
    /// dry provisioning mode.
    #[must_use]
    pub fn with_optional_bootstrap<Hook: BootstrapHook>(
        self,
        hook: Option<Hook>,
    ) -> ProvisionOrchestrator<P, Hook> {
        ProvisionOrchestrator {
            provider: self.provider,
            hook,
            poller: self.poller,
            storage: self.storage,
            max_parallel: self.max_parallel,
        }
    }

    /// Applies poll and storage retry budgets.
    #[must_use]
    pub fn with_timing(mut self, timing: &Timing) -> Self {
        self.poller = InstancePoller::new(timing.poll_interval, timing.poll_attempts);
        self.storage =
            StorageConfigurator::new(timing.storage_retry_delay, timing.storage_retry_attempts);
        self
    }

    /// Sets how many instances are configured concurrently. Values below one
    /// are treated as one.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Provider used for every call.
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Launches the batch and drives every returned instance to completion.
    ///
    /// Results are returned in batch order. Timed out and failed instances
    /// appear in the results; they are left in place at the provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Request`] for an invalid request,
    /// [`ProvisionError::Launch`] when the batch launch fails, and
    /// [`ProvisionError::Bootstrap`] when the hook fails. A hook failure
    /// stops the remaining instances from being processed.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Vec<InstanceResult>, ProvisionError<P::Error>> {
        request.validate()?;
        let spec = request.launch_spec();
        info!(
            count = spec.count,
            image = %spec.image_id,
            instance_type = %spec.instance_type,
            zone = spec.zone.as_deref().unwrap_or("provider default"),
            "launching instance batch"
        );

        let handles = self
            .provider
            .launch_batch(&spec)
            .await
            .map_err(ProvisionError::Launch)?;
        if handles.len() != usize::try_from(spec.count).unwrap_or(usize::MAX) {
            warn!(
                requested = spec.count,
                returned = handles.len(),
                "provider returned a different number of instances than requested"
            );
        }

        let lifecycles = handles.into_iter().enumerate().map(|(position, handle)| {
            let offset = u32::try_from(position).unwrap_or(u32::MAX);
            self.drive(request, handle, offset)
        });

        if self.max_parallel == 1 {
            let mut results = Vec::new();
            for lifecycle in lifecycles {
                results.push(lifecycle.await?);
            }
            return Ok(results);
        }

        stream::iter(lifecycles)
            .buffered(self.max_parallel)
            .try_collect()
            .await
    }

    async fn drive(
        &self,
        request: &ProvisionRequest,
        handle: InstanceHandle,
        offset: u32,
    ) -> Result<InstanceResult, ProvisionError<P::Error>> {
        let mut record = InstanceRecord::new(handle, request, offset);

        let poll = self
            .poller
            .wait_until_running(&self.provider, &record.handle)
            .await;
        record.status = poll.status;
        record.attempts = poll.attempts;
        record.failure = poll.failure;
        if record.status != InstanceStatus::Running {
            return Ok(record.into_result());
        }

        record.storage = self
            .storage
            .apply_policy(&self.provider, &record.handle, request.storage_policy())
            .await;

        match self.provider.get_addresses(&record.handle).await {
            Ok(addresses) => record.addresses = addresses,
            Err(err) => {
                warn!(instance = %record.handle.id, error = %err, "could not fetch addresses");
            }
        }

        if let Some(name) = record.assigned_name.as_deref() {
            match self.provider.tag(&record.handle, NAME_TAG, name).await {
                Ok(()) => record.tagged = true,
                Err(err) => {
                    warn!(instance = %record.handle.id, hostname = name, error = %err, "tagging failed");
                }
            }
        }

        self.dispatch_bootstrap(&mut record).await?;

        info!(
            instance = %record.handle.id,
            hostname = record.assigned_name.as_deref().unwrap_or("-"),
            "instance ready"
        );
        Ok(record.into_result())
    }

    async fn dispatch_bootstrap(
        &self,
        record: &mut InstanceRecord,
    ) -> Result<(), ProvisionError<P::Error>> {
        let (Some(hostname), Some(hook)) = (record.assigned_name.clone(), self.hook.as_ref()) else {
            return Ok(());
        };

        let target = BootstrapTarget {
            hostname,
            public_ip: record.addresses.public_ip,
            private_ip: record.addresses.private_ip,
        };
        info!(instance = %record.handle.id, hostname = %target.hostname, "bootstrapping");
        hook.bootstrap(&target)
            .await
            .map_err(|source| ProvisionError::Bootstrap {
                hostname: target.hostname.clone(),
                source,
            })?;
        record.bootstrapped = true;
        Ok(())
    }
}
