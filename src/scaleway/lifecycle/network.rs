//! SSH key and security group lookups for the Scaleway provider.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::provider::SecurityGroupOutcome;
use crate::scaleway::types::Zone;

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::{HTTP_CLIENT, SCALEWAY_IAM_API_BASE, SCALEWAY_INSTANCE_API_BASE};

#[derive(Deserialize)]
struct NamedResource {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct SshKeyList {
    #[serde(default)]
    ssh_keys: Vec<NamedResource>,
}

#[derive(Deserialize)]
struct SecurityGroupList {
    #[serde(default)]
    security_groups: Vec<NamedResource>,
}

#[derive(Serialize)]
struct CreateSecurityGroupRequest<'a> {
    name: &'a str,
    project: &'a str,
    description: &'a str,
    stateful: bool,
    inbound_default_policy: &'a str,
    outbound_default_policy: &'a str,
}

fn find_by_name(resources: Vec<NamedResource>, name: &str) -> Option<String> {
    resources
        .into_iter()
        .find(|resource| resource.name == name)
        .map(|resource| resource.id)
}

impl ScalewayProvider {
    /// Confirms that the SSH key named `name` is registered in the project.
    pub(in crate::scaleway) async fn verify_ssh_key(
        &self,
        name: &str,
    ) -> Result<(), ScalewayProviderError> {
        let url = format!("{SCALEWAY_IAM_API_BASE}/ssh-keys");
        let listing: SshKeyList = self
            .send_json(
                HTTP_CLIENT
                    .get(&url)
                    .query(&[("name", name), ("project_id", self.project_id.as_str())]),
            )
            .await?;
        if find_by_name(listing.ssh_keys, name).is_some() {
            return Ok(());
        }
        Err(ScalewayProviderError::SshKeyNotFound {
            name: name.to_owned(),
            project_id: self.project_id.clone(),
        })
    }

    async fn find_security_group(
        &self,
        zone: &Zone,
        name: &str,
    ) -> Result<Option<String>, ScalewayProviderError> {
        let url = format!(
            "{SCALEWAY_INSTANCE_API_BASE}/zones/{}/security_groups",
            zone.as_str()
        );
        let listing: SecurityGroupList = self
            .send_json(
                HTTP_CLIENT
                    .get(&url)
                    .query(&[("name", name), ("project", self.project_id.as_str())]),
            )
            .await?;
        Ok(find_by_name(listing.security_groups, name))
    }

    /// Resolves a security group name to its id.
    pub(in crate::scaleway) async fn security_group_id(
        &self,
        zone: &Zone,
        name: &str,
    ) -> Result<String, ScalewayProviderError> {
        self.find_security_group(zone, name)
            .await?
            .ok_or_else(|| ScalewayProviderError::SecurityGroupNotFound {
                name: name.to_owned(),
                zone: zone.as_str().to_owned(),
            })
    }

    /// Creates the security group unless one with that name exists.
    pub(in crate::scaleway) async fn ensure_security_group(
        &self,
        zone: &Zone,
        name: &str,
    ) -> Result<SecurityGroupOutcome, ScalewayProviderError> {
        if self.find_security_group(zone, name).await?.is_some() {
            return Ok(SecurityGroupOutcome::AlreadyExists);
        }

        let url = format!(
            "{SCALEWAY_INSTANCE_API_BASE}/zones/{}/security_groups",
            zone.as_str()
        );
        let payload = CreateSecurityGroupRequest {
            name,
            project: &self.project_id,
            description: "managed by fleetup",
            stateful: true,
            inbound_default_policy: "drop",
            outbound_default_policy: "accept",
        };
        match self.send(HTTP_CLIENT.post(&url).json(&payload)).await {
            Ok(_) => {
                info!(group = name, zone = zone.as_str(), "security group created");
                Ok(SecurityGroupOutcome::Created)
            }
            Err(err) if err.has_status(409) => Ok(SecurityGroupOutcome::AlreadyExists),
            Err(err) => Err(err),
        }
    }
}
