//! Command-line interface definitions for the `fleetup` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `fleetup` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fleetup",
    about = "Provision, name, and bootstrap batches of cloud instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Launch a batch of instances and report their addresses.
    #[command(name = "launch", about = "Launch a batch of instances")]
    Launch(LaunchCommand),
    /// Validate configuration without contacting the provider.
    #[command(name = "check", about = "Validate configuration and list missing keys")]
    Check,
}

/// Arguments for the `fleetup launch` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct LaunchCommand {
    /// Instance type (commercial type) for every instance in the batch.
    ///
    /// Values outside the configured enumeration fall back to the default
    /// type with a warning, or fail with `--strict`.
    #[arg(short = 's', long, value_name = "TYPE")]
    pub(crate) instance_type: Option<String>,
    /// Additional security groups, comma separated. Missing groups are
    /// created before launch.
    #[arg(short = 'g', long, value_name = "GROUPS", value_delimiter = ',')]
    pub(crate) security_groups: Vec<String>,
    /// Hostname template; `%s` (or `%`) is replaced with the instance index.
    #[arg(short = 'n', long = "name", value_name = "TEMPLATE")]
    pub(crate) name_template: Option<String>,
    /// Number of instances to launch together.
    #[arg(
        short = 'x',
        long,
        value_name = "COUNT",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub(crate) count: Option<u32>,
    /// Image id or label.
    ///
    /// Images the provider cannot find fall back to the default image with a
    /// warning, or fail with `--strict`.
    #[arg(short = 'a', long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Keep volumes after the instances terminate.
    #[arg(short = 'p', long)]
    pub(crate) persist_storage: bool,
    /// First hostname index.
    #[arg(short = 'v', long, value_name = "SEED", allow_negative_numbers = true)]
    pub(crate) seed: Option<i64>,
    /// Availability zone; defaults to the first zone of the region.
    #[arg(short = 'z', long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// SSH key registered with the provider.
    #[arg(short = 'k', long, value_name = "KEY")]
    pub(crate) ssh_key: Option<String>,
    /// Run the configured bootstrap command for every named, running
    /// instance.
    #[arg(short = 'b', long)]
    pub(crate) bootstrap: bool,
    /// Reject invalid instance types and images instead of falling back.
    #[arg(long)]
    pub(crate) strict: bool,
    /// Instances configured concurrently after launch.
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub(crate) parallel: Option<u64>,
    /// Print the report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}
