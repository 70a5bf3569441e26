//! Cloud provider abstraction used by the provisioning core.
//!
//! The orchestrator never talks to a provider SDK directly. Everything it
//! needs (batch launch, status, addresses, tagging, storage policy, security
//! groups, and image lookup) goes through [`CloudProvider`].

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use serde::Serialize;

/// Parameters for one atomic batch launch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchSpec {
    /// Provider specific machine image identifier.
    pub image_id: String,
    /// Commercial type or size of every instance in the batch.
    pub instance_type: String,
    /// Security groups to attach, duplicates already collapsed.
    pub security_groups: Vec<String>,
    /// Number of instances requested together.
    pub count: u32,
    /// Pre-existing provider-side SSH key reference.
    pub ssh_key: String,
    /// Optional placement; `None` lets the provider choose.
    pub zone: Option<String>,
}

/// Handle returned by a provider for each launched instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceHandle {
    /// Provider specific identifier for the instance.
    pub id: String,
    /// Zone in which the instance was created.
    pub zone: String,
}

/// State reported by the provider for a single status query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceState {
    /// The instance is still booting.
    Pending,
    /// The instance is up and accepts configuration.
    Running,
    /// Any other terminal state, carrying the provider's description.
    Failed {
        /// Raw state or reason reported by the provider.
        reason: String,
    },
}

/// Network addresses assigned to a running instance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InstanceAddresses {
    /// Public address, when one has been allocated.
    pub public_ip: Option<IpAddr>,
    /// Private address inside the provider network.
    pub private_ip: Option<IpAddr>,
}

/// Storage lifetime policy applied to an instance's root volume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoragePolicy {
    /// Volumes are removed together with the instance.
    DeleteOnTermination,
    /// Volumes outlive the instance.
    Persist,
}

impl StoragePolicy {
    /// Returns the policy for a request's `persist_storage` flag.
    #[must_use]
    pub const fn from_persist_flag(persist_storage: bool) -> Self {
        if persist_storage {
            Self::Persist
        } else {
            Self::DeleteOnTermination
        }
    }

    /// Stable label used when the policy has to be recorded as text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeleteOnTermination => "delete-on-termination",
            Self::Persist => "persist",
        }
    }
}

/// Result of a security group creation attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecurityGroupOutcome {
    /// The group did not exist and was created.
    Created,
    /// A group with that name was already present.
    AlreadyExists,
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Capability implemented by cloud providers.
pub trait CloudProvider {
    /// Provider specific error type returned by every operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Launches `spec.count` instances in one all-or-nothing request and
    /// returns their handles in launch order.
    fn launch_batch<'a>(
        &'a self,
        spec: &'a LaunchSpec,
    ) -> ProviderFuture<'a, Vec<InstanceHandle>, Self::Error>;

    /// Queries the current state of one instance.
    fn get_status<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ProviderFuture<'a, InstanceState, Self::Error>;

    /// Fetches the addresses of a running instance.
    fn get_addresses<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ProviderFuture<'a, InstanceAddresses, Self::Error>;

    /// Applies a storage lifetime policy to the instance's volumes.
    fn modify_storage_attribute<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        policy: StoragePolicy,
    ) -> ProviderFuture<'a, (), Self::Error>;

    /// Sets a key/value tag on the instance.
    fn tag<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error>;

    /// Creates a security group, reporting whether it already existed.
    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> ProviderFuture<'a, SecurityGroupOutcome, Self::Error>;

    /// Returns `true` when the image is visible to the configured account.
    fn image_exists<'a>(&'a self, image_id: &'a str) -> ProviderFuture<'a, bool, Self::Error>;
}
