//! Resource validators and the override resolution that feeds them.
//!
//! The validators are independent and run before launch. Unknown instance
//! types and images fall back to the configured defaults with a warning
//! unless strict mode is enabled; unexpected provider failures always
//! propagate.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::hostname;
use crate::instance_type::{InstanceType, InstanceTypeCatalog};
use crate::provider::{CloudProvider, SecurityGroupOutcome};
use crate::request::{ProvisionRequest, RequestError};

/// Errors raised while resolving user overrides.
#[derive(Debug, Error)]
pub enum OverrideError<ProviderError>
where
    ProviderError: std::error::Error + 'static,
{
    /// Unexpected provider failure (not "already exists", not "not found").
    #[error("provider error while validating overrides: {0}")]
    Provider(#[source] ProviderError),
    /// Raised in strict mode instead of falling back to a default.
    #[error("rejected {field} override '{value}': {reason}")]
    Rejected {
        /// Override that was rejected.
        field: &'static str,
        /// Value supplied by the user.
        value: String,
        /// Why the value is unusable.
        reason: &'static str,
    },
    /// Raised when the resolved request is invalid.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Ensures a security group exists, creating it when absent.
///
/// "Already exists" is success, so calling this twice with the same name
/// succeeds both times.
///
/// # Errors
///
/// Returns the provider error for any failure other than "already exists".
pub async fn ensure_security_group<P: CloudProvider>(
    provider: &P,
    name: &str,
) -> Result<SecurityGroupOutcome, P::Error> {
    let outcome = provider.create_security_group(name).await?;
    match outcome {
        SecurityGroupOutcome::Created => info!(group = name, "created security group"),
        SecurityGroupOutcome::AlreadyExists => {
            info!(group = name, "security group already exists");
        }
    }
    Ok(outcome)
}

/// Returns `true` iff `value` belongs to the instance type enumeration.
#[must_use]
pub fn validate_instance_type(catalog: &InstanceTypeCatalog, value: &str) -> bool {
    catalog.contains(value)
}

/// Returns `true` iff the provider can see `image_id`.
///
/// # Errors
///
/// Returns the provider error when the lookup fails for any reason other
/// than the image being absent.
pub async fn validate_image_id<P: CloudProvider>(
    provider: &P,
    image_id: &str,
) -> Result<bool, P::Error> {
    provider.image_exists(image_id).await
}

/// User supplied values layered over [`Settings`] defaults.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Overrides {
    /// Requested instance type.
    pub instance_type: Option<String>,
    /// Security groups added to the configured base groups.
    pub security_groups: Vec<String>,
    /// Hostname template.
    pub name_template: Option<String>,
    /// Number of instances.
    pub count: Option<u32>,
    /// Requested image.
    pub image_id: Option<String>,
    /// Keep volumes after termination.
    pub persist_storage: bool,
    /// Starting hostname index.
    pub seed: Option<i64>,
    /// Placement zone.
    pub zone: Option<String>,
    /// SSH key reference.
    pub ssh_key: Option<String>,
    /// Reject invalid overrides instead of falling back.
    pub strict: bool,
}

/// Validates `overrides` against the provider and builds the request.
///
/// Additional security groups are ensured before being appended to the base
/// groups. An instance type outside the enumeration or an image the provider
/// cannot find is replaced by the configured default with a warning, or
/// rejected when strict mode is enabled by either `overrides` or `settings`.
///
/// # Errors
///
/// Returns [`OverrideError::Provider`] for unexpected provider failures,
/// [`OverrideError::Rejected`] for invalid values in strict mode, and
/// [`OverrideError::Request`] when the resulting request is invalid.
pub async fn resolve_overrides<P: CloudProvider>(
    provider: &P,
    settings: &Settings,
    overrides: &Overrides,
) -> Result<ProvisionRequest, OverrideError<P::Error>> {
    let strict = overrides.strict || settings.strict_overrides;

    for group in &overrides.security_groups {
        let trimmed = group.trim();
        if trimmed.is_empty() || settings.base_security_groups.iter().any(|base| base == trimmed) {
            continue;
        }
        ensure_security_group(provider, trimmed)
            .await
            .map_err(OverrideError::Provider)?;
    }

    let instance_type = resolve_instance_type(settings, overrides.instance_type.as_deref(), strict)?;
    let image_id = resolve_image(provider, settings, overrides.image_id.as_deref(), strict).await?;
    let count = overrides.count.unwrap_or(settings.default_count);
    if let Some(template) = overrides.name_template.as_deref()
        && count > 1
        && !hostname::has_marker(template)
    {
        warn!(
            template,
            count,
            "name template has no single marker; every instance gets the same name"
        );
    }

    let request = ProvisionRequest::builder(instance_type)
        .image_id(image_id)
        .security_groups(settings.base_security_groups.iter().cloned())
        .security_groups(overrides.security_groups.iter().cloned())
        .count(count)
        .zone(overrides.zone.clone())
        .ssh_key_ref(
            overrides
                .ssh_key
                .clone()
                .unwrap_or_else(|| settings.default_ssh_key.clone()),
        )
        .persist_storage(overrides.persist_storage)
        .name_template(overrides.name_template.clone())
        .seed(overrides.seed.unwrap_or(crate::request::DEFAULT_SEED))
        .build()?;
    Ok(request)
}

fn resolve_instance_type<E>(
    settings: &Settings,
    requested: Option<&str>,
    strict: bool,
) -> Result<InstanceType, OverrideError<E>>
where
    E: std::error::Error + 'static,
{
    let Some(value) = requested.map(str::trim) else {
        return Ok(settings.default_instance_type.clone());
    };
    if let Some(instance_type) = settings.catalog.get(value) {
        return Ok(instance_type);
    }
    if strict {
        return Err(OverrideError::Rejected {
            field: "instance type",
            value: value.to_owned(),
            reason: "not in the instance type enumeration",
        });
    }
    warn!(
        requested = value,
        fallback = %settings.default_instance_type,
        "invalid instance type; using default"
    );
    Ok(settings.default_instance_type.clone())
}

async fn resolve_image<P: CloudProvider>(
    provider: &P,
    settings: &Settings,
    requested: Option<&str>,
    strict: bool,
) -> Result<String, OverrideError<P::Error>> {
    let Some(value) = requested.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(settings.default_image.clone());
    };
    if validate_image_id(provider, value)
        .await
        .map_err(OverrideError::Provider)?
    {
        return Ok(value.to_owned());
    }
    if strict {
        return Err(OverrideError::Rejected {
            field: "image",
            value: value.to_owned(),
            reason: "image not found",
        });
    }
    warn!(
        requested = value,
        fallback = %settings.default_image,
        "image not found; using default"
    );
    Ok(settings.default_image.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    #[tokio::test]
    async fn ensure_security_group_is_idempotent() {
        let provider = ScriptedProvider::new();

        let first = ensure_security_group(&provider, "web").await;
        let second = ensure_security_group(&provider, "web").await;

        assert_eq!(first, Ok(SecurityGroupOutcome::Created));
        assert_eq!(second, Ok(SecurityGroupOutcome::AlreadyExists));
        assert_eq!(provider.security_groups(), vec![String::from("web")]);
    }

    #[tokio::test]
    async fn ensure_security_group_propagates_other_failures() {
        let provider = ScriptedProvider::new();
        provider.fail_security_group("web");

        let result = ensure_security_group(&provider, "web").await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn validate_image_id_distinguishes_missing_from_errors() {
        let provider = ScriptedProvider::new();
        provider.add_image("img-known");

        assert_eq!(validate_image_id(&provider, "img-known").await, Ok(true));
        assert_eq!(validate_image_id(&provider, "img-missing").await, Ok(false));

        provider.fail_image_lookups();
        assert!(validate_image_id(&provider, "img-known").await.is_err());
    }

    #[test]
    fn validate_instance_type_checks_membership() {
        let catalog = InstanceTypeCatalog::new(["DEV1-S", "DEV1-M"]);
        assert!(validate_instance_type(&catalog, "DEV1-M"));
        assert!(!validate_instance_type(&catalog, "m1.small"));
    }
}
