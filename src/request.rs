//! Immutable provisioning request handed to the orchestrator.

use thiserror::Error;

use crate::instance_type::InstanceType;
use crate::provider::{LaunchSpec, StoragePolicy};

/// Default starting offset for hostname numbering.
pub const DEFAULT_SEED: i64 = 1;

/// Everything the orchestrator needs to launch and configure one batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Provider specific machine image identifier.
    pub image_id: String,
    /// Size of every instance in the batch.
    pub instance_type: InstanceType,
    /// Security groups in first-seen order, duplicates collapsed.
    pub security_groups: Vec<String>,
    /// Number of instances requested atomically. Always positive.
    pub count: u32,
    /// Optional placement; `None` lets the provider choose.
    pub zone: Option<String>,
    /// Pre-existing provider-side SSH key pair.
    pub ssh_key_ref: String,
    /// Whether the root volume outlives the instance.
    pub persist_storage: bool,
    /// Optional hostname template consumed by [`crate::hostname::increment`].
    pub name_template: Option<String>,
    /// Starting offset for hostname numbering.
    pub seed: i64,
}

impl ProvisionRequest {
    /// Starts a builder for a [`ProvisionRequest`].
    #[must_use]
    pub fn builder(instance_type: InstanceType) -> ProvisionRequestBuilder {
        ProvisionRequestBuilder::new(instance_type)
    }

    /// Storage policy implied by [`Self::persist_storage`].
    #[must_use]
    pub const fn storage_policy(&self) -> StoragePolicy {
        StoragePolicy::from_persist_flag(self.persist_storage)
    }

    /// Parameters for the atomic batch launch.
    #[must_use]
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            image_id: self.image_id.clone(),
            instance_type: self.instance_type.as_str().to_owned(),
            security_groups: self.security_groups.clone(),
            count: self.count,
            ssh_key: self.ssh_key_ref.clone(),
            zone: self.zone.clone(),
        }
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when a required field is empty, the count is
    /// zero, or the hostname indices would overflow.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.image_id.is_empty() {
            return Err(RequestError::MissingField(String::from("image_id")));
        }
        if self.ssh_key_ref.is_empty() {
            return Err(RequestError::MissingField(String::from("ssh_key_ref")));
        }
        if self.count == 0 {
            return Err(RequestError::ZeroCount);
        }
        if self.zone.as_deref().is_some_and(str::is_empty) {
            return Err(RequestError::MissingField(String::from("zone")));
        }
        if self.name_template.as_deref().is_some_and(str::is_empty) {
            return Err(RequestError::MissingField(String::from("name_template")));
        }
        if self.seed.checked_add(i64::from(self.count - 1)).is_none() {
            return Err(RequestError::SeedOverflow {
                seed: self.seed,
                count: self.count,
            });
        }
        Ok(())
    }
}

/// Builder for [`ProvisionRequest`] that trims inputs and collapses duplicate
/// security groups before validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequestBuilder {
    image_id: String,
    instance_type: InstanceType,
    security_groups: Vec<String>,
    count: u32,
    zone: Option<String>,
    ssh_key_ref: String,
    persist_storage: bool,
    name_template: Option<String>,
    seed: i64,
}

impl ProvisionRequestBuilder {
    /// Creates a builder for one instance of the given size.
    #[must_use]
    pub const fn new(instance_type: InstanceType) -> Self {
        Self {
            image_id: String::new(),
            instance_type,
            security_groups: Vec::new(),
            count: 1,
            zone: None,
            ssh_key_ref: String::new(),
            persist_storage: false,
            name_template: None,
            seed: DEFAULT_SEED,
        }
    }

    /// Sets the image identifier.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = value.into();
        self
    }

    /// Appends security groups; duplicates are collapsed at build time.
    #[must_use]
    pub fn security_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_groups
            .extend(groups.into_iter().map(Into::into));
        self
    }

    /// Sets the number of instances.
    #[must_use]
    pub const fn count(mut self, value: u32) -> Self {
        self.count = value;
        self
    }

    /// Sets the optional placement zone.
    #[must_use]
    pub fn zone(mut self, value: Option<String>) -> Self {
        self.zone = value;
        self
    }

    /// Sets the SSH key reference.
    #[must_use]
    pub fn ssh_key_ref(mut self, value: impl Into<String>) -> Self {
        self.ssh_key_ref = value.into();
        self
    }

    /// Sets whether storage persists after termination.
    #[must_use]
    pub const fn persist_storage(mut self, value: bool) -> Self {
        self.persist_storage = value;
        self
    }

    /// Sets the optional hostname template.
    #[must_use]
    pub fn name_template(mut self, value: Option<String>) -> Self {
        self.name_template = value;
        self
    }

    /// Sets the hostname numbering seed.
    #[must_use]
    pub const fn seed(mut self, value: i64) -> Self {
        self.seed = value;
        self
    }

    /// Builds and validates the [`ProvisionRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when validation fails.
    pub fn build(self) -> Result<ProvisionRequest, RequestError> {
        let request = ProvisionRequest {
            image_id: self.image_id.trim().to_owned(),
            instance_type: self.instance_type,
            security_groups: collapse_groups(self.security_groups),
            count: self.count,
            zone: self.zone.map(|value| value.trim().to_owned()),
            ssh_key_ref: self.ssh_key_ref.trim().to_owned(),
            persist_storage: self.persist_storage,
            name_template: self.name_template.map(|value| value.trim().to_owned()),
            seed: self.seed,
        };
        request.validate()?;
        Ok(request)
    }
}

fn collapse_groups(groups: Vec<String>) -> Vec<String> {
    let mut collapsed: Vec<String> = Vec::with_capacity(groups.len());
    for group in groups {
        let trimmed = group.trim();
        if trimmed.is_empty() || collapsed.iter().any(|known| known == trimmed) {
            continue;
        }
        collapsed.push(trimmed.to_owned());
    }
    collapsed
}

/// Errors raised while building a [`ProvisionRequest`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a required field is blank.
    #[error("missing or empty field: {0}")]
    MissingField(String),
    /// Raised when zero instances are requested.
    #[error("instance count must be greater than zero")]
    ZeroCount,
    /// Raised when `seed + count - 1` does not fit in an `i64`.
    #[error("seed {seed} is too large for a batch of {count} instances")]
    SeedOverflow {
        /// Requested seed.
        seed: i64,
        /// Requested count.
        count: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance_type::InstanceTypeCatalog;

    fn dev1_s() -> InstanceType {
        InstanceTypeCatalog::default()
            .get("DEV1-S")
            .expect("DEV1-S is built in")
    }

    fn base() -> ProvisionRequestBuilder {
        ProvisionRequest::builder(dev1_s())
            .image_id("img-1")
            .ssh_key_ref("deploy")
    }

    #[test]
    fn build_collapses_duplicate_groups_in_order() {
        let request = base()
            .security_groups(["web", "base", " web ", "", "base", "db"])
            .build()
            .expect("request should be valid");
        assert_eq!(request.security_groups, vec!["web", "base", "db"]);
    }

    #[test]
    fn build_rejects_zero_count() {
        let error = base().count(0).build().expect_err("zero count");
        assert_eq!(error, RequestError::ZeroCount);
    }

    #[test]
    fn build_rejects_blank_image_and_key() {
        let error = base().image_id("  ").build().expect_err("blank image");
        assert_eq!(error, RequestError::MissingField(String::from("image_id")));

        let error = base().ssh_key_ref("").build().expect_err("blank key");
        assert_eq!(error, RequestError::MissingField(String::from("ssh_key_ref")));
    }

    #[test]
    fn build_rejects_blank_template_and_zone() {
        let error = base()
            .name_template(Some(String::from(" ")))
            .build()
            .expect_err("blank template");
        assert_eq!(
            error,
            RequestError::MissingField(String::from("name_template"))
        );

        let error = base()
            .zone(Some(String::new()))
            .build()
            .expect_err("blank zone");
        assert_eq!(error, RequestError::MissingField(String::from("zone")));
    }

    #[test]
    fn build_rejects_seed_overflow() {
        let error = base()
            .count(2)
            .seed(i64::MAX)
            .build()
            .expect_err("overflow");
        assert!(matches!(error, RequestError::SeedOverflow { count: 2, .. }));
    }

    #[test]
    fn launch_spec_mirrors_request() {
        let request = base()
            .count(3)
            .zone(Some(String::from("fr-par-2")))
            .security_groups(["base"])
            .build()
            .expect("request should be valid");
        let spec = request.launch_spec();
        assert_eq!(spec.count, 3);
        assert_eq!(spec.instance_type, "DEV1-S");
        assert_eq!(spec.zone.as_deref(), Some("fr-par-2"));
        assert_eq!(spec.security_groups, vec!["base"]);
        assert_eq!(spec.ssh_key, "deploy");
    }

    #[test]
    fn storage_policy_defaults_to_delete_on_termination() {
        let request = base().build().expect("request should be valid");
        assert_eq!(request.storage_policy(), StoragePolicy::DeleteOnTermination);
        assert_eq!(request.seed, DEFAULT_SEED);
    }
}
