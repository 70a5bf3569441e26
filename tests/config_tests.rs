//! Tests for configuration validation and the typed settings it produces.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::time::Duration;

use fleetup::config::split_list;
use fleetup::test_support::EnvGuard;
use fleetup::{ConfigError, FleetupConfig};
use rstest::*;

use test_constants::{DEFAULT_INSTANCE_TYPE, PROJECT_ID, VALID_ENV};

#[fixture]
fn valid_config() -> FleetupConfig {
    FleetupConfig {
        access_key: Some(String::from("SCWACCESSKEYEXAMPLE")),
        secret_key: Some(String::from("SCWSECRETKEYEXAMPLE")),
        region: Some(String::from("fr-par")),
        project_id: Some(String::from(PROJECT_ID)),
        base_security_groups: Some(String::from("base, ssh")),
        default_ssh_key: Some(String::from("deploy")),
        default_image: String::from("ubuntu_noble"),
        default_instance_type: String::from(DEFAULT_INSTANCE_TYPE),
        instance_types: None,
        default_count: 1,
        bootstrap_command: None,
        poll_interval_secs: 10,
        poll_attempts: 18,
        storage_retry_attempts: 5,
        storage_retry_delay_secs: 10,
        max_parallel: 1,
        strict_overrides: false,
    }
}

#[rstest]
fn valid_config_produces_typed_settings(valid_config: FleetupConfig) {
    let settings = valid_config.validate().expect("config is valid");

    assert_eq!(settings.region, "fr-par");
    assert_eq!(settings.base_security_groups, vec!["base", "ssh"]);
    assert_eq!(settings.default_instance_type.as_str(), DEFAULT_INSTANCE_TYPE);
    assert_eq!(settings.timing.poll_interval, Duration::from_secs(10));
    assert_eq!(settings.timing.poll_attempts, 18);
    assert_eq!(settings.timing.storage_retry_attempts, 5);
    assert!(settings.bootstrap_command.is_none());
}

#[rstest]
fn every_missing_key_is_reported_together(valid_config: FleetupConfig) {
    let cfg = FleetupConfig {
        access_key: None,
        secret_key: None,
        region: None,
        project_id: None,
        base_security_groups: None,
        default_ssh_key: None,
        ..valid_config
    };

    let error = cfg.validate().expect_err("nothing mandatory is set");
    let ConfigError::MissingFields(ref fields) = error else {
        panic!("expected MissingFields, got {error}");
    };
    let keys: Vec<_> = fields.iter().map(|field| field.toml_key).collect();
    assert_eq!(
        keys,
        vec![
            "access_key",
            "secret_key",
            "region",
            "project_id",
            "base_security_groups",
            "default_ssh_key",
        ]
    );
}

#[rstest]
#[case::access_key(|cfg: &mut FleetupConfig| cfg.access_key = None, "FLEETUP_ACCESS_KEY", "access_key")]
#[case::secret_key(|cfg: &mut FleetupConfig| cfg.secret_key = Some(String::from("  ")), "FLEETUP_SECRET_KEY", "secret_key")]
#[case::region(|cfg: &mut FleetupConfig| cfg.region = None, "FLEETUP_REGION", "region")]
#[case::project(|cfg: &mut FleetupConfig| cfg.project_id = Some(String::new()), "FLEETUP_PROJECT_ID", "project_id")]
#[case::groups(|cfg: &mut FleetupConfig| cfg.base_security_groups = Some(String::from(" , ")), "FLEETUP_BASE_SECURITY_GROUPS", "base_security_groups")]
#[case::ssh_key(|cfg: &mut FleetupConfig| cfg.default_ssh_key = None, "FLEETUP_DEFAULT_SSH_KEY", "default_ssh_key")]
fn missing_key_message_is_actionable(
    valid_config: FleetupConfig,
    #[case] mutate: fn(&mut FleetupConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let message = cfg.validate().expect_err("validation should fail").to_string();

    assert!(message.contains(env_var), "should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "should mention {toml_key}: {message}");
    assert!(
        message.contains("fleetup.toml"),
        "should mention config file: {message}"
    );
}

#[rstest]
fn default_type_outside_enumeration_is_rejected(valid_config: FleetupConfig) {
    let cfg = FleetupConfig {
        instance_types: Some(String::from("DEV1-M,DEV1-L")),
        ..valid_config
    };

    let error = cfg.validate().expect_err("DEV1-S not enumerated");

    assert!(
        matches!(
            error,
            ConfigError::InvalidValue {
                field: "default_instance_type",
                ..
            }
        ),
        "unexpected error: {error}"
    );
}

#[rstest]
fn custom_enumeration_replaces_builtin_catalog(valid_config: FleetupConfig) {
    let cfg = FleetupConfig {
        instance_types: Some(String::from("DEV1-S, GPU-3070-S")),
        ..valid_config
    };

    let settings = cfg.validate().expect("valid");

    assert!(settings.catalog.contains("GPU-3070-S"));
    assert!(!settings.catalog.contains("DEV1-M"));
    assert_eq!(settings.catalog.len(), 2);
}

#[rstest]
#[case::count(|cfg: &mut FleetupConfig| cfg.default_count = 0, "default_count")]
#[case::polls(|cfg: &mut FleetupConfig| cfg.poll_attempts = 0, "poll_attempts")]
#[case::storage(|cfg: &mut FleetupConfig| cfg.storage_retry_attempts = 0, "storage_retry_attempts")]
#[case::parallel(|cfg: &mut FleetupConfig| cfg.max_parallel = 0, "max_parallel")]
fn zero_budgets_are_rejected(
    valid_config: FleetupConfig,
    #[case] mutate: fn(&mut FleetupConfig),
    #[case] expected_field: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("zero budget");

    let ConfigError::InvalidValue { field, .. } = error else {
        panic!("expected InvalidValue, got {error}");
    };
    assert_eq!(field, expected_field);
}

#[rstest]
fn bootstrap_command_is_required_only_on_demand(valid_config: FleetupConfig) {
    let settings = valid_config.clone().validate().expect("valid");
    assert_eq!(
        settings.require_bootstrap_command(),
        Err(ConfigError::BootstrapUnavailable)
    );

    let cfg = FleetupConfig {
        bootstrap_command: Some(String::from("/usr/local/bin/converge")),
        ..valid_config
    };
    let settings = cfg.validate().expect("valid");
    assert_eq!(
        settings.require_bootstrap_command(),
        Ok("/usr/local/bin/converge")
    );
}

#[rstest]
fn credentials_debug_redacts_secret(valid_config: FleetupConfig) {
    let settings = valid_config.validate().expect("valid");

    let rendered = format!("{:?}", settings.credentials);

    assert!(!rendered.contains("SCWSECRETKEYEXAMPLE"), "leaked: {rendered}");
    assert!(rendered.contains("SCWACCESSKEYEXAMPLE"));
}

#[rstest]
#[case("a,b,c", &["a", "b", "c"])]
#[case(" a , , b,a ", &["a", "b"])]
#[case("", &[])]
fn split_list_trims_and_collapses(#[case] input: &str, #[case] expected: &[&str]) {
    assert_eq!(split_list(input), expected);
}

#[rstest]
#[tokio::test]
async fn environment_layer_feeds_validation() {
    let _guard = EnvGuard::set_vars(VALID_ENV).await;

    let settings = FleetupConfig::load_without_cli_args()
        .expect("environment parses")
        .validate()
        .expect("environment is complete");

    assert_eq!(settings.project_id, PROJECT_ID);
    assert_eq!(settings.default_image, "fake-image");
    assert_eq!(settings.base_security_groups, vec!["base"]);
    assert_eq!(settings.timing.poll_attempts, 2);
    assert_eq!(settings.timing.poll_interval, Duration::ZERO);
}

#[rstest]
#[tokio::test]
async fn malformed_environment_value_is_a_parse_error() {
    let _guard = EnvGuard::set_vars(&[("FLEETUP_POLL_ATTEMPTS", "often")]).await;

    let result = FleetupConfig::load_without_cli_args();

    assert!(
        matches!(result, Err(ConfigError::Parse(_))),
        "unexpected result: {result:?}"
    );
}
