//! Error types for the Scaleway provider.

use scaleway_rs::ScalewayError;
use thiserror::Error;

/// Errors raised by the Scaleway provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayProviderError {
    /// Raised when the configured SSH key is not registered in the project.
    #[error("ssh key '{name}' not found in project {project_id}")]
    SshKeyNotFound {
        /// Key name looked up.
        name: String,
        /// Project searched.
        project_id: String,
    },
    /// Raised when a security group name cannot be resolved to an id.
    #[error("security group '{name}' not found in zone {zone}")]
    SecurityGroupNotFound {
        /// Group name looked up.
        name: String,
        /// Zone searched.
        zone: String,
    },
    /// Raised when an image label matches no available image.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label passed by the caller.
        label: String,
        /// Architecture searched.
        arch: String,
        /// Zone searched.
        zone: String,
    },
    /// Raised when an instance cannot be powered on.
    #[error("instance {instance_id} in state {state} cannot be powered on")]
    PowerOnNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
    },
    /// Raised when a server disappears while it is being configured.
    #[error("instance {instance_id} not found in zone {zone}")]
    InstanceNotFound {
        /// Provider instance identifier.
        instance_id: String,
        /// Zone searched.
        zone: String,
    },
    /// Raised when one server of a batch could not be created. Servers
    /// created before it have been deleted.
    #[error("batch launch failed at instance {index}: {message}")]
    BatchAborted {
        /// Zero-based position of the failing server in the batch.
        index: u32,
        /// Provider message for the failure.
        message: String,
        /// Servers that could not be deleted during rollback.
        leaked: Vec<String>,
    },
    /// Raised when the API answers with an error status.
    #[error("scaleway API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or provider message.
        message: String,
    },
    /// Wrapper for transport and SDK level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the transport or SDK.
        message: String,
    },
}

impl ScalewayProviderError {
    /// Returns `true` for an API error with the given status code.
    #[must_use]
    pub const fn has_status(&self, code: u16) -> bool {
        matches!(self, Self::Api { status, .. } if *status == code)
    }
}

impl From<ScalewayError> for ScalewayProviderError {
    fn from(value: ScalewayError) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for ScalewayProviderError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ScalewayProviderError {
    fn from(value: serde_json::Error) -> Self {
        Self::Provider {
            message: format!("unexpected response body: {value}"),
        }
    }
}
