//! Behavioural tests for `fleetup launch` against the scripted provider.
//!
//! The binary is built with the `test-backdoors` feature so
//! `FLEETUP_FAKE_PROVIDER` can swap the Scaleway client for an in-memory
//! provider.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::sync::LazyLock;

use escargot::CargoBuild;
use predicates::prelude::*;
use predicates::str::contains;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use test_constants::VALID_ENV;

#[expect(
    clippy::expect_used,
    reason = "test setup requires panic on build failure"
)]
static FLEETUP_BIN: LazyLock<escargot::CargoRun> = LazyLock::new(|| {
    CargoBuild::new()
        .bin("fleetup")
        .features("test-backdoors")
        .run()
        .expect("failed to build fleetup with test-backdoors feature")
});

struct LaunchContext {
    home: TempDir,
}

impl LaunchContext {
    fn command(&self, mode: &str) -> assert_cmd::Command {
        let mut cmd: assert_cmd::Command = FLEETUP_BIN.command().into();
        cmd.env("HOME", self.home.path());
        cmd.env("XDG_CONFIG_HOME", self.home.path().join(".config"));
        cmd.env_remove("FLEETUP_BOOTSTRAP_COMMAND");
        cmd.env_remove("FLEETUP_CONFIG_PATH");
        cmd.current_dir(self.home.path());
        cmd.envs(VALID_ENV.iter().copied());
        cmd.env("FLEETUP_FAKE_PROVIDER", mode);
        cmd.arg("launch");
        cmd
    }
}

#[fixture]
fn context() -> LaunchContext {
    LaunchContext {
        home: TempDir::new().expect("temp dir"),
    }
}

#[rstest]
fn launch_reports_every_named_instance(context: LaunchContext) {
    let mut cmd = context.command("running");
    cmd.args(["-n", "web-%s.example.com", "-x", "2"]);

    cmd.assert().success().stdout(
        contains("Hostname: web-1.example.com")
            .and(contains("Hostname: web-2.example.com"))
            .and(contains("Public IP Address: 203.0.113.1"))
            .and(contains("Private IP Address: 10.0.0.2"))
            .and(contains("Instance status: running")),
    );
}

#[rstest]
fn launch_without_template_leaves_hostname_blank(context: LaunchContext) {
    let mut cmd = context.command("running");

    cmd.assert()
        .success()
        .stdout(contains("Hostname: -").and(contains("Instance status: running")));
}

#[rstest]
fn launch_emits_json_on_request(context: LaunchContext) {
    let mut cmd = context.command("running");
    cmd.args(["-n", "db-%", "-v", "5", "--json"]);

    let output = cmd.output().expect("run fleetup");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(
        report.pointer("/0/name").and_then(serde_json::Value::as_str),
        Some("db-5")
    );
    assert_eq!(
        report.pointer("/0/status").and_then(serde_json::Value::as_str),
        Some("running")
    );
    assert_eq!(
        report.pointer("/0/tagged").and_then(serde_json::Value::as_bool),
        Some(true)
    );
}

#[rstest]
fn pending_instances_are_reported_as_timed_out(context: LaunchContext) {
    let mut cmd = context.command("pending");
    cmd.args(["-n", "web-%"]);

    cmd.assert()
        .success()
        .stdout(contains("Instance status: timed_out").and(contains("Public IP Address: -")));
}

#[rstest]
fn launch_failure_exits_non_zero(context: LaunchContext) {
    let mut cmd = context.command("launch-failure");

    cmd.assert()
        .code(1)
        .stderr(contains("failed to launch instances").and(contains("quota exceeded")));
}

#[rstest]
fn strict_override_rejects_unknown_type(context: LaunchContext) {
    let mut cmd = context.command("running");
    cmd.args(["-s", "m1.small", "--strict"]);

    cmd.assert()
        .code(1)
        .stderr(contains("invalid overrides").and(contains("m1.small")));
}

#[rstest]
fn lenient_override_falls_back_to_default_type(context: LaunchContext) {
    let mut cmd = context.command("running");
    cmd.args(["-s", "m1.small", "-a", "missing-image"]);

    cmd.assert().success().stdout(contains("Instance status: running"));
}

#[rstest]
fn bootstrap_without_command_fails_before_launch(context: LaunchContext) {
    let mut cmd = context.command("running");
    cmd.args(["-n", "web-%", "-b"]);

    cmd.assert()
        .code(1)
        .stderr(contains("FLEETUP_BOOTSTRAP_COMMAND"))
        .stdout(contains("Hostname").not());
}

#[cfg(unix)]
#[rstest]
#[case::succeeds("true", 0)]
#[case::fails("false", 1)]
fn bootstrap_command_exit_status_decides_outcome(
    context: LaunchContext,
    #[case] program: &str,
    #[case] expected_code: i32,
) {
    let mut cmd = context.command("running");
    cmd.env("FLEETUP_BOOTSTRAP_COMMAND", program);
    cmd.args(["-n", "web-%", "-b"]);

    cmd.assert().code(expected_code);
}
