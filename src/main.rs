//! Binary entry point for the `fleetup` CLI.

mod cli;

use std::fmt::Write as _;
use std::io::{self, Write};
use std::net::IpAddr;
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use cli::{Cli, LaunchCommand};
use fleetup::{
    CloudProvider, CommandBootstrap, ConfigError, FleetupConfig, InstanceResult, Overrides,
    ProvisionOrchestrator, ScalewayProvider, Settings, resolve_overrides,
};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid overrides: {0}")]
    Overrides(String),
    #[error("provisioning failed: {0}")]
    Provision(String),
    #[error("failed to write report: {0}")]
    Report(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Launch(command) => launch_command(command).await,
        Cli::Check => check_command(),
    }
}

fn load_settings() -> Result<Settings, CliError> {
    let config = FleetupConfig::load_without_cli_args()?;
    Ok(config.validate()?)
}

fn check_command() -> Result<(), CliError> {
    let settings = load_settings()?;
    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "configuration OK: region {}, project {}, {} base security group(s)",
        settings.region,
        settings.project_id,
        settings.base_security_groups.len()
    )
    .map_err(|err| CliError::Report(err.to_string()))
}

async fn launch_command(args: LaunchCommand) -> Result<(), CliError> {
    let settings = load_settings()?;

    #[cfg(feature = "test-backdoors")]
    if let Some(provider) = backdoor::provider_from_env() {
        return launch_with(provider, &settings, &args).await;
    }

    let provider = ScalewayProvider::new(&settings);
    launch_with(provider, &settings, &args).await
}

async fn launch_with<P: CloudProvider>(
    provider: P,
    settings: &Settings,
    args: &LaunchCommand,
) -> Result<(), CliError> {
    let hook = if args.bootstrap {
        Some(CommandBootstrap::with_process_runner(
            settings.require_bootstrap_command()?,
        ))
    } else {
        None
    };
    let parallel = args
        .parallel
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(settings.max_parallel);

    let orchestrator = ProvisionOrchestrator::from_settings(provider, settings)
        .with_max_parallel(parallel)
        .with_optional_bootstrap(hook);

    let request = resolve_overrides(orchestrator.provider(), settings, &overrides_from(args))
        .await
        .map_err(|err| CliError::Overrides(err.to_string()))?;
    let results = orchestrator
        .provision(&request)
        .await
        .map_err(|err| CliError::Provision(err.to_string()))?;

    let rendered = if args.json {
        serde_json::to_string_pretty(&results).map_err(|err| CliError::Report(err.to_string()))?
    } else {
        render_report(&results)
    };
    writeln!(io::stdout(), "{rendered}").map_err(|err| CliError::Report(err.to_string()))
}

fn overrides_from(args: &LaunchCommand) -> Overrides {
    Overrides {
        instance_type: args.instance_type.clone(),
        security_groups: args.security_groups.clone(),
        name_template: args.name_template.clone(),
        count: args.count,
        image_id: args.image.clone(),
        persist_storage: args.persist_storage,
        seed: args.seed,
        zone: args.zone.clone(),
        ssh_key: args.ssh_key.clone(),
        strict: args.strict,
    }
}

fn render_ip(ip: Option<IpAddr>) -> String {
    ip.map_or_else(|| String::from("-"), |value| value.to_string())
}

fn render_report(results: &[InstanceResult]) -> String {
    let mut report = String::new();
    for (position, result) in results.iter().enumerate() {
        if position > 0 {
            report.push('\n');
        }
        writeln!(
            report,
            "Hostname: {}",
            result.name.as_deref().unwrap_or("-")
        )
        .ok();
        writeln!(report, "Public IP Address: {}", render_ip(result.public_ip)).ok();
        writeln!(report, "Private IP Address: {}", render_ip(result.private_ip)).ok();
        writeln!(report, "Instance status: {}", result.status.as_str()).ok();
    }
    report.trim_end().to_owned()
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(feature = "test-backdoors")]
mod backdoor {
    //! Scripted provider wiring used by the CLI tests.

    use std::env;

    use fleetup::test_support::{InstanceScript, ScriptedProvider};

    const FAKE_PROVIDER_ENV: &str = "FLEETUP_FAKE_PROVIDER";

    /// Returns a scripted provider when `FLEETUP_FAKE_PROVIDER` is set.
    pub(crate) fn provider_from_env() -> Option<ScriptedProvider> {
        let mode = env::var(FAKE_PROVIDER_ENV).ok()?;
        let provider = ScriptedProvider::new();
        provider.add_image("fake-image");
        match mode.as_str() {
            "pending" => {
                for _ in 0..16 {
                    provider.script_launch(InstanceScript::pending_forever());
                }
            }
            "launch-failure" => provider.fail_next_launch("quota exceeded"),
            _ => {}
        }
        Some(provider)
    }
}
