//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Instance type used when no override is provided.
pub const DEFAULT_INSTANCE_TYPE: &str = "DEV1-S";

/// Placeholder project identifier.
pub const PROJECT_ID: &str = "11111111-2222-3333-4444-555555555555";

/// Environment for a configuration that passes validation.
pub const VALID_ENV: &[(&str, &str)] = &[
    ("FLEETUP_ACCESS_KEY", "SCWACCESSKEYEXAMPLE"),
    ("FLEETUP_SECRET_KEY", "dummy-secret"),
    ("FLEETUP_REGION", "fr-par"),
    ("FLEETUP_PROJECT_ID", PROJECT_ID),
    ("FLEETUP_BASE_SECURITY_GROUPS", "base"),
    ("FLEETUP_DEFAULT_SSH_KEY", "deploy"),
    ("FLEETUP_DEFAULT_IMAGE", "fake-image"),
    ("FLEETUP_POLL_INTERVAL_SECS", "0"),
    ("FLEETUP_POLL_ATTEMPTS", "2"),
    ("FLEETUP_STORAGE_RETRY_DELAY_SECS", "0"),
];
