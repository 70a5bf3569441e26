//! Configuration loading via `ortho-config` and the settings validator.
//!
//! [`FleetupConfig`] is the loosely-typed bundle merged from defaults,
//! `fleetup.toml`, and `FLEETUP_*` environment variables. [`FleetupConfig::validate`]
//! checks every mandatory key before any provider call is made and converts
//! the bundle into [`Settings`], the typed value threaded through the rest of
//! the crate.

use std::ffi::OsString;
use std::fmt;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::instance_type::{InstanceType, InstanceTypeCatalog};
use crate::poller::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use crate::storage::{DEFAULT_STORAGE_ATTEMPTS, DEFAULT_STORAGE_DELAY};

/// Image used when neither configuration nor CLI names one.
pub const DEFAULT_IMAGE: &str = "ubuntu_noble";

/// Instance type used when neither configuration nor CLI names one.
pub const DEFAULT_INSTANCE_TYPE: &str = "DEV1-S";

const CONFIG_FILE_NAME: &str = "fleetup.toml";

/// Provisioning settings derived from environment variables and
/// configuration files.
///
/// List-valued keys (`base_security_groups`, `instance_types`) are
/// comma-separated strings so they can be supplied through a single
/// environment variable.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FLEETUP",
    discovery(
        app_name = "fleetup",
        env_var = "FLEETUP_CONFIG_PATH",
        config_file_name = "fleetup.toml",
        dotfile_name = ".fleetup.toml",
        project_file_name = "fleetup.toml"
    )
)]
pub struct FleetupConfig {
    /// Credential identifier (Scaleway access key).
    pub access_key: Option<String>,
    /// Credential secret used to authenticate API calls.
    pub secret_key: Option<String>,
    /// Region that hosts the instances (for example `fr-par`).
    pub region: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub project_id: Option<String>,
    /// Comma-separated security groups attached to every instance.
    pub base_security_groups: Option<String>,
    /// Name of the SSH key registered with the provider.
    pub default_ssh_key: Option<String>,
    /// Image identifier or label used when no override is given.
    #[ortho_config(default = DEFAULT_IMAGE.to_owned())]
    pub default_image: String,
    /// Instance type used when no valid override is given.
    #[ortho_config(default = DEFAULT_INSTANCE_TYPE.to_owned())]
    pub default_instance_type: String,
    /// Comma-separated enumeration of valid instance types. Defaults to the
    /// built-in Scaleway catalogue.
    pub instance_types: Option<String>,
    /// Number of instances launched when `--count` is absent.
    #[ortho_config(default = 1)]
    pub default_count: u32,
    /// Program run as the bootstrap hook with `<hostname> <public_ip>
    /// <private_ip>` arguments.
    pub bootstrap_command: Option<String>,
    /// Seconds between status polls.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Status polls attempted before an instance is declared timed out.
    #[ortho_config(default = 18)]
    pub poll_attempts: u32,
    /// Attempts made to apply the storage policy.
    #[ortho_config(default = 5)]
    pub storage_retry_attempts: u32,
    /// Seconds between storage policy attempts.
    #[ortho_config(default = 10)]
    pub storage_retry_delay_secs: u64,
    /// Instances configured concurrently after launch. `1` is sequential.
    #[ortho_config(default = 1)]
    pub max_parallel: usize,
    /// Reject invalid overrides instead of falling back to defaults.
    #[ortho_config(default = false)]
    pub strict_overrides: bool,
}

/// Describes one mandatory key and how to provide it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MissingField {
    /// Human readable description.
    pub description: &'static str,
    /// Environment variable that supplies the key.
    pub env_var: &'static str,
    /// Key name inside `fleetup.toml`.
    pub toml_key: &'static str,
}

impl MissingField {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: set {} or add {} to {CONFIG_FILE_NAME}",
            self.description, self.env_var, self.toml_key
        )
    }
}

fn render_missing(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Lists every mandatory key that is absent or empty.
    #[error("missing configuration fields: {}", render_missing(.0))]
    MissingFields(Vec<MissingField>),
    /// Raised when a present value is unusable.
    #[error("invalid configuration value for {field}: {message}")]
    InvalidValue {
        /// Offending key.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
    /// Raised when bootstrapping is requested without a bootstrap command.
    #[error(
        "bootstrap requested but no bootstrap command is configured: set \
         FLEETUP_BOOTSTRAP_COMMAND or add bootstrap_command to fleetup.toml"
    )]
    BootstrapUnavailable,
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

/// Provider credentials.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Credential identifier.
    pub access_key: String,
    /// Credential secret.
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Poll and retry budgets used after launch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timing {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Status polls before giving up.
    pub poll_attempts: u32,
    /// Delay between storage policy attempts.
    pub storage_retry_delay: Duration,
    /// Storage policy attempts before giving up.
    pub storage_retry_attempts: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            storage_retry_delay: DEFAULT_STORAGE_DELAY,
            storage_retry_attempts: DEFAULT_STORAGE_ATTEMPTS,
        }
    }
}

/// Validated configuration threaded through constructors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    /// Provider credentials.
    pub credentials: Credentials,
    /// Region hosting the instances.
    pub region: String,
    /// Project used for billing and scoping.
    pub project_id: String,
    /// Groups attached to every instance, duplicates collapsed.
    pub base_security_groups: Vec<String>,
    /// SSH key used when no override is given.
    pub default_ssh_key: String,
    /// Image used when no valid override is given.
    pub default_image: String,
    /// Instance type used when no valid override is given.
    pub default_instance_type: InstanceType,
    /// Enumeration of valid instance types.
    pub catalog: InstanceTypeCatalog,
    /// Instances launched when no count is given.
    pub default_count: u32,
    /// Program used as the bootstrap hook, if any.
    pub bootstrap_command: Option<String>,
    /// Poll and retry budgets.
    pub timing: Timing,
    /// Maximum instances configured concurrently.
    pub max_parallel: usize,
    /// Reject invalid overrides instead of falling back.
    pub strict_overrides: bool,
}

impl Settings {
    /// Returns the bootstrap command, failing when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BootstrapUnavailable`] when
    /// `bootstrap_command` is unset.
    pub fn require_bootstrap_command(&self) -> Result<&str, ConfigError> {
        self.bootstrap_command
            .as_deref()
            .ok_or(ConfigError::BootstrapUnavailable)
    }
}

/// Splits a comma-separated list, trimming entries and dropping blanks and
/// repeats while keeping first-seen order.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim) {
        if item.is_empty() || items.iter().any(|known| known == item) {
            continue;
        }
        items.push(item.to_owned());
    }
    items
}

fn present(value: Option<&String>) -> Option<String> {
    value
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

impl FleetupConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("fleetup")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks every mandatory key and converts the bundle into [`Settings`].
    ///
    /// All missing keys are reported together so a single run shows the
    /// complete list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFields`] listing every absent mandatory
    /// key, or [`ConfigError::InvalidValue`] when an optional value is
    /// unusable.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let access_key = present(self.access_key.as_ref());
        let secret_key = present(self.secret_key.as_ref());
        let region = present(self.region.as_ref());
        let project_id = present(self.project_id.as_ref());
        let groups = self
            .base_security_groups
            .as_deref()
            .map(split_list)
            .filter(|groups| !groups.is_empty());
        let ssh_key = present(self.default_ssh_key.as_ref());

        let mut missing = Vec::new();
        if access_key.is_none() {
            missing.push(MissingField::new(
                "credential id",
                "FLEETUP_ACCESS_KEY",
                "access_key",
            ));
        }
        if secret_key.is_none() {
            missing.push(MissingField::new(
                "credential secret",
                "FLEETUP_SECRET_KEY",
                "secret_key",
            ));
        }
        if region.is_none() {
            missing.push(MissingField::new("region", "FLEETUP_REGION", "region"));
        }
        if project_id.is_none() {
            missing.push(MissingField::new(
                "project ID",
                "FLEETUP_PROJECT_ID",
                "project_id",
            ));
        }
        if groups.is_none() {
            missing.push(MissingField::new(
                "base security group list",
                "FLEETUP_BASE_SECURITY_GROUPS",
                "base_security_groups",
            ));
        }
        if ssh_key.is_none() {
            missing.push(MissingField::new(
                "default SSH key",
                "FLEETUP_DEFAULT_SSH_KEY",
                "default_ssh_key",
            ));
        }

        let (
            Some(access_key),
            Some(secret_key),
            Some(region),
            Some(project_id),
            Some(base_security_groups),
            Some(default_ssh_key),
        ) = (access_key, secret_key, region, project_id, groups, ssh_key)
        else {
            return Err(ConfigError::MissingFields(missing));
        };

        let catalog = self
            .instance_types
            .as_deref()
            .map_or_else(InstanceTypeCatalog::default, |list| {
                InstanceTypeCatalog::new(split_list(list))
            });
        let default_instance_type = self.typed_default_instance_type(&catalog)?;
        self.check_budgets()?;

        let default_image = self.default_image.trim().to_owned();
        if default_image.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_image",
                message: String::from("must not be empty"),
            });
        }

        Ok(Settings {
            credentials: Credentials {
                access_key,
                secret_key,
            },
            region,
            project_id,
            base_security_groups,
            default_ssh_key,
            default_image,
            default_instance_type,
            catalog,
            default_count: self.default_count,
            bootstrap_command: present(self.bootstrap_command.as_ref()),
            timing: Timing {
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                poll_attempts: self.poll_attempts,
                storage_retry_delay: Duration::from_secs(self.storage_retry_delay_secs),
                storage_retry_attempts: self.storage_retry_attempts,
            },
            max_parallel: self.max_parallel,
            strict_overrides: self.strict_overrides,
        })
    }

    fn typed_default_instance_type(
        &self,
        catalog: &InstanceTypeCatalog,
    ) -> Result<InstanceType, ConfigError> {
        if catalog.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "instance_types",
                message: String::from("enumeration must list at least one type"),
            });
        }
        let wanted = self.default_instance_type.trim();
        catalog.get(wanted).ok_or_else(|| ConfigError::InvalidValue {
            field: "default_instance_type",
            message: format!("'{wanted}' is not in the instance type enumeration"),
        })
    }

    fn check_budgets(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, bool); 4] = [
            ("default_count", self.default_count > 0),
            ("poll_attempts", self.poll_attempts > 0),
            ("storage_retry_attempts", self.storage_retry_attempts > 0),
            ("max_parallel", self.max_parallel > 0),
        ];
        for (field, ok) in positive {
            if !ok {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: String::from("must be greater than zero"),
                });
            }
        }
        Ok(())
    }
}
