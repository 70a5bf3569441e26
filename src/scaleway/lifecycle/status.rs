//! Server lookups for the Scaleway provider.

use crate::provider::InstanceHandle;

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::{HTTP_CLIENT, InstanceSnapshot, SCALEWAY_INSTANCE_API_BASE, ServerEnvelope};

impl ScalewayProvider {
    /// Fetches a server, returning `None` once it no longer exists.
    pub(in crate::scaleway) async fn fetch_server(
        &self,
        handle: &InstanceHandle,
    ) -> Result<Option<InstanceSnapshot>, ScalewayProviderError> {
        let url = format!(
            "{SCALEWAY_INSTANCE_API_BASE}/zones/{}/servers/{}",
            handle.zone, handle.id
        );
        match self
            .send_json::<ServerEnvelope>(HTTP_CLIENT.get(&url))
            .await
        {
            Ok(envelope) => Ok(Some(InstanceSnapshot::from(envelope.server))),
            Err(err) if err.has_status(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub(in crate::scaleway) async fn require_server(
        &self,
        handle: &InstanceHandle,
    ) -> Result<InstanceSnapshot, ScalewayProviderError> {
        self.fetch_server(handle)
            .await?
            .ok_or_else(|| ScalewayProviderError::InstanceNotFound {
                instance_id: handle.id.clone(),
                zone: handle.zone.clone(),
            })
    }
}
