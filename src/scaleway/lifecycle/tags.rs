//! Tag updates for the Scaleway provider.
//!
//! Scaleway tags are plain strings, so key/value pairs are stored as
//! `key=value`. Writing a key replaces any earlier value for it.

use serde::Serialize;
use tracing::debug;

use crate::orchestrator::NAME_TAG;
use crate::provider::InstanceHandle;

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::{HTTP_CLIENT, SCALEWAY_INSTANCE_API_BASE, ServerEnvelope};

#[derive(Serialize)]
struct UpdateServerRequest {
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

/// Returns `existing` with `key` set to `value`, keeping unrelated tags in
/// their original order.
pub(in crate::scaleway) fn merge_tag(existing: &[String], key: &str, value: &str) -> Vec<String> {
    let prefix = format!("{key}=");
    let mut tags: Vec<String> = existing
        .iter()
        .filter(|tag| !tag.starts_with(&prefix))
        .cloned()
        .collect();
    tags.push(format!("{prefix}{value}"));
    tags
}

impl ScalewayProvider {
    /// Writes a `key=value` tag with a read-modify-write `PATCH`. The
    /// [`NAME_TAG`] key also renames the server.
    pub(in crate::scaleway) async fn write_tag(
        &self,
        handle: &InstanceHandle,
        key: &str,
        value: &str,
    ) -> Result<(), ScalewayProviderError> {
        let server = self.require_server(handle).await?;
        let payload = UpdateServerRequest {
            tags: merge_tag(&server.tags, key, value),
            name: (key == NAME_TAG).then(|| value.to_owned()),
        };
        debug!(instance = %handle.id, key, value, previous_name = %server.name, "updating server tags");

        let url = format!(
            "{SCALEWAY_INSTANCE_API_BASE}/zones/{}/servers/{}",
            handle.zone, handle.id
        );
        self.send_json::<ServerEnvelope>(HTTP_CLIENT.patch(&url).json(&payload))
            .await?;
        Ok(())
    }
}
