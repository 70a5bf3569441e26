//! Handoff of freshly provisioned instances to a user-supplied bootstrap
//! routine.
//!
//! The orchestrator only knows the [`BootstrapHook`] trait. Whatever the hook
//! does is opaque; its errors are returned to the caller untouched.

use std::ffi::OsString;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use shell_escape::unix::escape;
use thiserror::Error;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use crate::command::{CommandRunner, ProcessCommandRunner, SpawnError};

/// Instance details passed to the hook.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapTarget {
    /// Hostname assigned to the instance.
    pub hostname: String,
    /// Public address, when allocated.
    pub public_ip: Option<IpAddr>,
    /// Private address, when allocated.
    pub private_ip: Option<IpAddr>,
}

/// Errors surfaced by bootstrap hooks.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Raised when the bootstrap program cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when the bootstrap program exits unsuccessfully.
    #[error("bootstrap command {program} exited with {status_text}: {stderr}")]
    CommandFailure {
        /// Program that was run.
        program: String,
        /// Exit code, if the process reported one.
        status: Option<i32>,
        /// Human readable exit status.
        status_text: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised by custom hooks.
    #[error("bootstrap failed: {0}")]
    Other(String),
}

/// Future returned by [`BootstrapHook::bootstrap`].
pub type BootstrapFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BootstrapError>> + Send + 'a>>;

/// External bootstrap capability invoked once per named, running instance.
pub trait BootstrapHook {
    /// Bootstraps the instance described by `target`.
    fn bootstrap<'a>(&'a self, target: &'a BootstrapTarget) -> BootstrapFuture<'a>;
}

/// Hook that runs a local program with `<hostname> <public_ip> <private_ip>`
/// arguments. Absent addresses are passed as empty strings.
#[derive(Clone, Debug)]
pub struct CommandBootstrap<R: CommandRunner> {
    program: String,
    runner: R,
}

impl CommandBootstrap<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner(program: impl Into<String>) -> Self {
        Self::new(program, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> CommandBootstrap<R> {
    /// Creates a hook that runs `program` through `runner`.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Arguments passed to the program for `target`.
    #[must_use]
    pub fn arguments(target: &BootstrapTarget) -> Vec<OsString> {
        let render = |ip: Option<IpAddr>| ip.map(|value| value.to_string()).unwrap_or_default();
        vec![
            OsString::from(&target.hostname),
            OsString::from(render(target.public_ip)),
            OsString::from(render(target.private_ip)),
        ]
    }

    fn run_blocking(&self, target: &BootstrapTarget) -> Result<(), BootstrapError> {
        let args = Self::arguments(target);
        debug!(
            command = %render_command(&self.program, &args),
            "running bootstrap command"
        );
        let output = self.runner.run(&self.program, &args)?;
        if output.is_success() {
            info!(hostname = %target.hostname, "bootstrap finished");
            return Ok(());
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown status"), |code| format!("status {code}"));
        Err(BootstrapError::CommandFailure {
            program: self.program.clone(),
            status: output.code,
            status_text,
            stderr: output.stderr.trim().to_owned(),
        })
    }
}

impl<R> BootstrapHook for CommandBootstrap<R>
where
    R: CommandRunner + Clone + Send + 'static,
{
    /// Runs the program on the blocking pool so concurrent lifecycles keep
    /// polling while it executes.
    fn bootstrap<'a>(&'a self, target: &'a BootstrapTarget) -> BootstrapFuture<'a> {
        let hook = self.clone();
        let owned = target.clone();
        Box::pin(async move {
            spawn_blocking(move || hook.run_blocking(&owned))
                .await
                .unwrap_or_else(|err| {
                    Err(BootstrapError::Other(format!("bootstrap task failed: {err}")))
                })
        })
    }
}

fn render_command(program: &str, args: &[OsString]) -> String {
    let mut rendered = String::from(escape(program.into()).as_ref());
    for arg in args {
        rendered.push(' ');
        let text = arg.to_string_lossy();
        rendered.push_str(escape(text).as_ref());
    }
    rendered
}
