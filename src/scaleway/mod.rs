//! Scaleway Instances implementation of [`CloudProvider`].

mod error;
mod lifecycle;
mod types;

use scaleway_rs::ScalewayApi;

use crate::config::Settings;
use crate::provider::{
    CloudProvider, InstanceAddresses, InstanceHandle, InstanceState, LaunchSpec, ProviderFuture,
    SecurityGroupOutcome, StoragePolicy,
};
use types::Zone;

pub use error::ScalewayProviderError;

/// Tag recording the storage lifetime policy of a server.
pub const STORAGE_POLICY_TAG: &str = "storage-policy";

/// Tag added to every server created by this crate.
pub const FLEETUP_TAG: &str = "fleetup";

const IMAGE_ARCH: &str = "x86_64";

/// Provider backed by the Scaleway Instances and IAM APIs.
#[derive(Clone)]
pub struct ScalewayProvider {
    api: ScalewayApi,
    secret_key: String,
    project_id: String,
    default_zone: Zone,
}

impl ScalewayProvider {
    /// Builds a provider from validated settings.
    ///
    /// Launches without an explicit zone go to the first zone of the
    /// configured region (`<region>-1`).
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            api: ScalewayApi::new(&settings.credentials.secret_key),
            secret_key: settings.credentials.secret_key.clone(),
            project_id: settings.project_id.clone(),
            default_zone: Zone::for_region(&settings.region),
        }
    }

    fn zone_for(&self, spec: &LaunchSpec) -> Zone {
        spec.zone
            .as_deref()
            .map_or_else(|| self.default_zone.clone(), Zone::from)
    }
}

impl CloudProvider for ScalewayProvider {
    type Error = ScalewayProviderError;

    fn launch_batch<'a>(
        &'a self,
        spec: &'a LaunchSpec,
    ) -> ProviderFuture<'a, Vec<InstanceHandle>, Self::Error> {
        Box::pin(async move {
            let zone = self.zone_for(spec);
            self.launch_servers(&zone, spec).await
        })
    }

    fn get_status<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ProviderFuture<'a, InstanceState, Self::Error> {
        Box::pin(async move {
            let snapshot = self.fetch_server(handle).await?;
            Ok(snapshot.map_or_else(
                || InstanceState::Failed {
                    reason: String::from("server no longer exists"),
                },
                |server| server.lifecycle_state(),
            ))
        })
    }

    fn get_addresses<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ProviderFuture<'a, InstanceAddresses, Self::Error> {
        Box::pin(async move {
            let server = self.require_server(handle).await?;
            Ok(server.addresses())
        })
    }

    fn modify_storage_attribute<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        policy: StoragePolicy,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.write_tag(handle, STORAGE_POLICY_TAG, policy.as_str())
                .await
        })
    }

    fn tag<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.write_tag(handle, key, value).await })
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> ProviderFuture<'a, SecurityGroupOutcome, Self::Error> {
        Box::pin(async move { self.ensure_security_group(&self.default_zone, name).await })
    }

    fn image_exists<'a>(&'a self, image_id: &'a str) -> ProviderFuture<'a, bool, Self::Error> {
        Box::pin(async move { self.lookup_image(&self.default_zone, image_id).await })
    }
}
