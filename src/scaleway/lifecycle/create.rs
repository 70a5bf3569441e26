//! Batch creation for the Scaleway provider.
//!
//! Scaleway has no multi-server create call, so a batch is created one server
//! at a time. Each server is created stopped and then powered on. When a
//! creation fails, the servers created before it are deleted so the batch
//! stays all-or-nothing.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::provider::{InstanceHandle, LaunchSpec};
use crate::scaleway::FLEETUP_TAG;
use crate::scaleway::types::Zone;

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::{HTTP_CLIENT, InstanceSnapshot, SCALEWAY_INSTANCE_API_BASE, ServerEnvelope};

#[derive(Serialize)]
struct CreateServerRequest<'a> {
    name: String,
    commercial_type: &'a str,
    image: &'a str,
    project: &'a str,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: Vec<String>,
    stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_group: Option<&'a str>,
}

/// Resolved parameters shared by every server of one batch.
struct BatchPlan<'a> {
    zone: &'a Zone,
    spec: &'a LaunchSpec,
    image_id: String,
    security_group_id: Option<String>,
}

impl ScalewayProvider {
    /// Creates `spec.count` servers in `zone` and powers them on.
    pub(in crate::scaleway) async fn launch_servers(
        &self,
        zone: &Zone,
        spec: &LaunchSpec,
    ) -> Result<Vec<InstanceHandle>, ScalewayProviderError> {
        self.verify_ssh_key(&spec.ssh_key).await?;
        let image_id = self.resolve_image_id(zone, &spec.image_id).await?;

        let (attached, ignored) = match spec.security_groups.split_first() {
            Some((first, rest)) => (Some(first), rest),
            None => (None, &[][..]),
        };
        if !ignored.is_empty() {
            warn!(
                ignored = ?ignored,
                "scaleway attaches one security group per server; extra groups ignored"
            );
        }
        let security_group_id = match attached {
            Some(name) => Some(self.security_group_id(zone, name).await?),
            None => None,
        };

        let plan = BatchPlan {
            zone,
            spec,
            image_id,
            security_group_id,
        };
        let mut handles = Vec::new();
        for index in 0..spec.count {
            match self.create_and_start(&plan).await {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    let leaked = self.rollback(&handles).await;
                    return Err(ScalewayProviderError::BatchAborted {
                        index,
                        message: err.to_string(),
                        leaked,
                    });
                }
            }
        }
        info!(count = handles.len(), zone = zone.as_str(), "servers created");
        Ok(handles)
    }

    async fn create_and_start(&self, plan: &BatchPlan<'_>) -> Result<InstanceHandle, ScalewayProviderError> {
        let snapshot = self.create_server_stopped(plan).await?;
        let handle = InstanceHandle {
            id: snapshot.id.as_str().to_owned(),
            zone: plan.zone.as_str().to_owned(),
        };
        if let Err(err) = self.power_on_if_needed(plan.zone, &snapshot).await {
            self.rollback(std::slice::from_ref(&handle)).await;
            return Err(err);
        }
        Ok(handle)
    }

    async fn create_server_stopped(
        &self,
        plan: &BatchPlan<'_>,
    ) -> Result<InstanceSnapshot, ScalewayProviderError> {
        let url = format!(
            "{SCALEWAY_INSTANCE_API_BASE}/zones/{}/servers",
            plan.zone.as_str()
        );
        let payload = CreateServerRequest {
            name: format!("fleetup-{}", Uuid::new_v4().simple()),
            commercial_type: &plan.spec.instance_type,
            image: &plan.image_id,
            project: &self.project_id,
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: vec![String::from(FLEETUP_TAG)],
            stopped: true,
            security_group: plan.security_group_id.as_deref(),
        };
        let envelope: ServerEnvelope = self
            .send_json(HTTP_CLIENT.post(&url).json(&payload))
            .await?;
        Ok(InstanceSnapshot::from(envelope.server))
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayProviderError> {
        if snapshot.state.as_str() == "running" {
            return Ok(());
        }

        if snapshot
            .allowed_actions
            .iter()
            .any(|action| action.as_str() == "poweron")
        {
            self.api
                .perform_instance_action_async(zone.as_str(), snapshot.id.as_str(), "poweron")
                .await?;
            return Ok(());
        }

        Err(ScalewayProviderError::PowerOnNotAllowed {
            instance_id: snapshot.id.as_str().to_owned(),
            state: snapshot.state.as_str().to_owned(),
        })
    }

    /// Deletes `handles`, returning the ids that could not be deleted.
    async fn rollback(&self, handles: &[InstanceHandle]) -> Vec<String> {
        let mut leaked = Vec::new();
        for handle in handles {
            match self.api.delete_instance_async(&handle.zone, &handle.id).await {
                Ok(_) => info!(instance = %handle.id, "rolled back server"),
                Err(err) => {
                    warn!(instance = %handle.id, error = %err, "rollback failed; server left in place");
                    leaked.push(handle.id.clone());
                }
            }
        }
        leaked
    }
}
