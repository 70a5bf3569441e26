//! Core library for the `fleetup` instance provisioning tool.
//!
//! A batch of instances is launched in one provider call, then every
//! instance is polled until it runs, has its storage policy applied, is
//! named and tagged, and is optionally handed to a bootstrap hook. The
//! provider sits behind the [`CloudProvider`] trait; [`ScalewayProvider`]
//! is the shipped implementation.

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod hostname;
pub mod instance_type;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod request;
pub mod scaleway;
pub mod storage;
pub mod test_support;
pub mod validators;

pub use bootstrap::{BootstrapError, BootstrapHook, BootstrapTarget, CommandBootstrap};
pub use command::{CommandOutput, CommandRunner, ProcessCommandRunner, SpawnError};
pub use config::{ConfigError, FleetupConfig, MissingField, Settings, Timing};
pub use instance_type::{InstanceType, InstanceTypeCatalog};
pub use orchestrator::{InstanceResult, NoBootstrap, ProvisionError, ProvisionOrchestrator};
pub use poller::{InstancePoller, InstanceStatus, PollOutcome};
pub use provider::{
    CloudProvider, InstanceAddresses, InstanceHandle, InstanceState, LaunchSpec,
    SecurityGroupOutcome, StoragePolicy,
};
pub use request::{ProvisionRequest, ProvisionRequestBuilder, RequestError};
pub use scaleway::{ScalewayProvider, ScalewayProviderError};
pub use storage::{StorageConfigurator, StorageOutcome};
pub use validators::{
    OverrideError, Overrides, ensure_security_group, resolve_overrides, validate_image_id,
    validate_instance_type,
};
