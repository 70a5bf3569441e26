//! Instance lifecycle helpers for the Scaleway provider.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

mod create;
mod image;
mod network;
mod status;
mod tags;

use crate::provider::{InstanceAddresses, InstanceState};
use crate::scaleway::types::{Action, InstanceId, ServerState};

use super::{ScalewayProvider, ScalewayProviderError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";
const SCALEWAY_IAM_API_BASE: &str = "https://api.scaleway.com/iam/v1alpha1";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Deserialize)]
struct ServerEnvelope {
    server: ServerModel,
}

#[derive(Deserialize)]
struct PublicIpModel {
    address: String,
}

#[derive(Deserialize)]
struct ServerModel {
    id: String,
    #[serde(default)]
    name: String,
    state: String,
    #[serde(default)]
    allowed_actions: Vec<String>,
    #[serde(default)]
    public_ip: Option<PublicIpModel>,
    #[serde(default)]
    public_ips: Vec<PublicIpModel>,
    #[serde(default)]
    private_ip: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Server fields the provider works with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSnapshot {
    pub(crate) id: InstanceId,
    pub(crate) name: String,
    pub(crate) state: ServerState,
    pub(crate) allowed_actions: Vec<Action>,
    pub(crate) public_ip: Option<String>,
    pub(crate) private_ip: Option<String>,
    pub(crate) tags: Vec<String>,
}

impl From<ServerModel> for InstanceSnapshot {
    fn from(server: ServerModel) -> Self {
        let public_ip = server
            .public_ip
            .or_else(|| server.public_ips.into_iter().next())
            .map(|ip| ip.address);
        Self {
            id: server.id.into(),
            name: server.name,
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
            public_ip,
            private_ip: server.private_ip,
            tags: server.tags,
        }
    }
}

impl InstanceSnapshot {
    /// Maps the Scaleway server state onto the provider-neutral states.
    ///
    /// `starting` and `stopped` count as pending because servers are created
    /// stopped and powered on right after.
    pub(crate) fn lifecycle_state(&self) -> InstanceState {
        match self.state.as_str() {
            "running" => InstanceState::Running,
            "starting" | "stopped" | "stopped in place" => InstanceState::Pending,
            other => InstanceState::Failed {
                reason: other.to_owned(),
            },
        }
    }

    pub(crate) fn addresses(&self) -> InstanceAddresses {
        InstanceAddresses {
            public_ip: parse_ip(self.public_ip.as_deref()),
            private_ip: parse_ip(self.private_ip.as_deref()),
        }
    }
}

fn parse_ip(value: Option<&str>) -> Option<IpAddr> {
    value.and_then(|text| text.parse().ok())
}

impl ScalewayProvider {
    /// Sends an authenticated request and decodes the JSON body.
    ///
    /// Error statuses become [`ScalewayProviderError::Api`] so callers can
    /// react to `404` and `409`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ScalewayProviderError> {
        let body = self.send(request).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, ScalewayProviderError> {
        let response = request
            .header("X-Auth-Token", &self.secret_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        Err(api_error(status, &body))
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> ScalewayProviderError {
    let message = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(body).map_or_else(
        |_| String::from_utf8_lossy(body).into_owned(),
        |api_err| api_err.message,
    );
    ScalewayProviderError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests;
