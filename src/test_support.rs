//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedProvider`] stands in for a cloud API, [`RecordingHook`] for a
//! bootstrap routine, and [`ScriptedRunner`] for local process execution.
//! All of them are cheap to clone and share their recorded state.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard as StdMutexGuard, PoisonError};

use futures::future::ready;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::bootstrap::{BootstrapError, BootstrapFuture, BootstrapHook, BootstrapTarget};
use crate::command::{CommandOutput, CommandRunner, SpawnError};
use crate::provider::{
    CloudProvider, InstanceAddresses, InstanceHandle, InstanceState, LaunchSpec, ProviderFuture,
    SecurityGroupOutcome, StoragePolicy,
};

/// Zone assigned to scripted instances when the launch names none.
pub const SCRIPTED_ZONE: &str = "fr-par-1";

/// Errors produced by [`ScriptedProvider`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedProviderError {
    /// Raised when a launch was scripted to fail.
    #[error("launch rejected: {0}")]
    LaunchRejected(String),
    /// Raised when an operation targets an instance the provider never saw.
    #[error("unknown instance {0}")]
    UnknownInstance(String),
    /// Raised when a failure was injected for an operation.
    #[error("injected {operation} failure for {target}")]
    Injected {
        /// Operation that failed.
        operation: &'static str,
        /// Instance or resource the operation targeted.
        target: String,
    },
}

/// Behaviour of one instance created by [`ScriptedProvider`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceScript {
    states: Vec<InstanceState>,
    addresses: Option<InstanceAddresses>,
    storage_failures: u32,
    fail_tags: bool,
    fail_addresses: bool,
}

impl InstanceScript {
    /// Instance that answers with `states` in order, repeating the last one.
    /// An empty list means the instance stays pending.
    #[must_use]
    pub const fn with_states(states: Vec<InstanceState>) -> Self {
        Self {
            states,
            addresses: None,
            storage_failures: 0,
            fail_tags: false,
            fail_addresses: false,
        }
    }

    /// Instance that is running on the first query.
    #[must_use]
    pub fn running() -> Self {
        Self::with_states(vec![InstanceState::Running])
    }

    /// Instance that never leaves the pending state.
    #[must_use]
    pub fn pending_forever() -> Self {
        Self::with_states(vec![InstanceState::Pending])
    }

    /// Instance that reports a failed state with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self::with_states(vec![InstanceState::Failed {
            reason: reason.to_owned(),
        }])
    }

    /// Overrides the addresses reported for the instance.
    #[must_use]
    pub const fn addresses(mut self, public_ip: Option<IpAddr>, private_ip: Option<IpAddr>) -> Self {
        self.addresses = Some(InstanceAddresses {
            public_ip,
            private_ip,
        });
        self
    }

    /// Rejects the first `failures` storage policy changes.
    #[must_use]
    pub const fn storage_failures(mut self, failures: u32) -> Self {
        self.storage_failures = failures;
        self
    }

    /// Rejects every tag write.
    #[must_use]
    pub const fn failing_tags(mut self) -> Self {
        self.fail_tags = true;
        self
    }

    /// Rejects every address lookup.
    #[must_use]
    pub const fn failing_addresses(mut self) -> Self {
        self.fail_addresses = true;
        self
    }
}

#[derive(Debug)]
struct ScriptedInstance {
    states: VecDeque<InstanceState>,
    last_state: InstanceState,
    addresses: InstanceAddresses,
    status_queries: u32,
    status_failures: u32,
    storage_attempts: u32,
    storage_failures: u32,
    storage_policy: Option<StoragePolicy>,
    fail_tags: bool,
    fail_addresses: bool,
    tags: Vec<(String, String)>,
}

impl ScriptedInstance {
    fn from_script(script: InstanceScript, sequence: u32) -> Self {
        let last_state = script
            .states
            .last()
            .cloned()
            .unwrap_or(InstanceState::Pending);
        let addresses = script
            .addresses
            .unwrap_or_else(|| default_addresses(sequence));
        Self {
            states: script.states.into(),
            last_state,
            addresses,
            status_queries: 0,
            status_failures: 0,
            storage_attempts: 0,
            storage_failures: script.storage_failures,
            storage_policy: None,
            fail_tags: script.fail_tags,
            fail_addresses: script.fail_addresses,
            tags: Vec::new(),
        }
    }

    fn next_state(&mut self) -> InstanceState {
        self.states
            .pop_front()
            .unwrap_or_else(|| self.last_state.clone())
    }
}

fn default_addresses(sequence: u32) -> InstanceAddresses {
    let octet = u8::try_from(sequence.saturating_add(1)).unwrap_or(u8::MAX);
    InstanceAddresses {
        public_ip: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, octet))),
        private_ip: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, octet))),
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    next_sequence: u32,
    order: Vec<InstanceHandle>,
    instances: BTreeMap<String, ScriptedInstance>,
    launch_queue: VecDeque<InstanceScript>,
    launch_failure: Option<String>,
    batch_limit: Option<usize>,
    launches: Vec<LaunchSpec>,
    security_groups: BTreeSet<String>,
    security_group_calls: usize,
    failing_groups: BTreeSet<String>,
    images: BTreeSet<String>,
    fail_image_lookups: bool,
}

impl ProviderState {
    fn register(&mut self, script: InstanceScript, zone: Option<&str>) -> InstanceHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let handle = InstanceHandle {
            id: format!("srv-{sequence:04}"),
            zone: zone.unwrap_or(SCRIPTED_ZONE).to_owned(),
        };
        self.instances.insert(
            handle.id.clone(),
            ScriptedInstance::from_script(script, sequence),
        );
        self.order.push(handle.clone());
        handle
    }

    fn instance(&mut self, handle: &InstanceHandle) -> Result<&mut ScriptedInstance, ScriptedProviderError> {
        self.instances
            .get_mut(&handle.id)
            .ok_or_else(|| ScriptedProviderError::UnknownInstance(handle.id.clone()))
    }

    fn launch(&mut self, spec: &LaunchSpec) -> Result<Vec<InstanceHandle>, ScriptedProviderError> {
        self.launches.push(spec.clone());
        if let Some(message) = self.launch_failure.take() {
            return Err(ScriptedProviderError::LaunchRejected(message));
        }
        let created = self
            .batch_limit
            .map_or(spec.count, |limit| spec.count.min(u32::try_from(limit).unwrap_or(u32::MAX)));
        let mut handles = Vec::new();
        for _ in 0..created {
            let script = self
                .launch_queue
                .pop_front()
                .unwrap_or_else(InstanceScript::running);
            handles.push(self.register(script, spec.zone.as_deref()));
        }
        Ok(handles)
    }

    fn status(&mut self, handle: &InstanceHandle) -> Result<InstanceState, ScriptedProviderError> {
        let instance = self.instance(handle)?;
        instance.status_queries += 1;
        if instance.status_failures > 0 {
            instance.status_failures -= 1;
            return Err(injected("status", handle));
        }
        Ok(instance.next_state())
    }

    fn addresses(&mut self, handle: &InstanceHandle) -> Result<InstanceAddresses, ScriptedProviderError> {
        let instance = self.instance(handle)?;
        if instance.fail_addresses {
            return Err(injected("address", handle));
        }
        Ok(instance.addresses)
    }

    fn storage(
        &mut self,
        handle: &InstanceHandle,
        policy: StoragePolicy,
    ) -> Result<(), ScriptedProviderError> {
        let instance = self.instance(handle)?;
        instance.storage_attempts += 1;
        if instance.storage_failures > 0 {
            instance.storage_failures -= 1;
            return Err(injected("storage", handle));
        }
        instance.storage_policy = Some(policy);
        Ok(())
    }

    fn tag(&mut self, handle: &InstanceHandle, key: &str, value: &str) -> Result<(), ScriptedProviderError> {
        let instance = self.instance(handle)?;
        if instance.fail_tags {
            return Err(injected("tag", handle));
        }
        instance.tags.retain(|(existing, _)| existing != key);
        instance.tags.push((key.to_owned(), value.to_owned()));
        Ok(())
    }

    fn security_group(&mut self, name: &str) -> Result<SecurityGroupOutcome, ScriptedProviderError> {
        self.security_group_calls += 1;
        if self.failing_groups.contains(name) {
            return Err(ScriptedProviderError::Injected {
                operation: "security group",
                target: name.to_owned(),
            });
        }
        if self.security_groups.insert(name.to_owned()) {
            Ok(SecurityGroupOutcome::Created)
        } else {
            Ok(SecurityGroupOutcome::AlreadyExists)
        }
    }

    fn image(&self, image_id: &str) -> Result<bool, ScriptedProviderError> {
        if self.fail_image_lookups {
            return Err(ScriptedProviderError::Injected {
                operation: "image lookup",
                target: image_id.to_owned(),
            });
        }
        Ok(self.images.contains(image_id))
    }
}

fn injected(operation: &'static str, handle: &InstanceHandle) -> ScriptedProviderError {
    ScriptedProviderError::Injected {
        operation,
        target: handle.id.clone(),
    }
}

/// In-memory [`CloudProvider`] with scriptable per-instance behaviour.
///
/// Unscripted launches produce instances that run on the first query and
/// carry addresses from `203.0.113.0/24` and `10.0.0.0/24`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl ScriptedProvider {
    /// Creates a provider with no instances, groups, or images.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StdMutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_instance<T>(&self, handle: &InstanceHandle, read: impl FnOnce(&ScriptedInstance) -> T) -> Option<T> {
        self.state().instances.get(&handle.id).map(read)
    }

    fn update_instance(&self, handle: &InstanceHandle, update: impl FnOnce(&mut ScriptedInstance)) {
        if let Some(instance) = self.state().instances.get_mut(&handle.id) {
            update(instance);
        }
    }

    /// Queues the behaviour of the next launched instance.
    pub fn script_launch(&self, script: InstanceScript) {
        self.state().launch_queue.push_back(script);
    }

    /// Makes the next batch launch fail with `message`.
    pub fn fail_next_launch(&self, message: &str) {
        self.state().launch_failure = Some(message.to_owned());
    }

    /// Caps the number of handles a batch launch returns.
    pub fn limit_batch(&self, limit: usize) {
        self.state().batch_limit = Some(limit);
    }

    /// Registers an instance outside a batch and returns its handle.
    pub fn preload_instance(&self, states: Vec<InstanceState>) -> InstanceHandle {
        self.state()
            .register(InstanceScript::with_states(states), None)
    }

    /// Launch specifications received so far.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.state().launches.clone()
    }

    /// Handles of every instance created so far, in creation order.
    #[must_use]
    pub fn handles(&self) -> Vec<InstanceHandle> {
        self.state().order.clone()
    }

    /// Status queries made against `handle`.
    #[must_use]
    pub fn status_queries(&self, handle: &InstanceHandle) -> u32 {
        self.with_instance(handle, |instance| instance.status_queries)
            .unwrap_or_default()
    }

    /// Makes the next `failures` status queries for `handle` error out.
    pub fn fail_status_queries(&self, handle: &InstanceHandle, failures: u32) {
        self.update_instance(handle, |instance| instance.status_failures = failures);
    }

    /// Makes the next `failures` storage changes for `handle` error out.
    pub fn fail_storage_attempts(&self, handle: &InstanceHandle, failures: u32) {
        self.update_instance(handle, |instance| instance.storage_failures = failures);
    }

    /// Storage policy changes attempted on `handle`.
    #[must_use]
    pub fn storage_attempts(&self, handle: &InstanceHandle) -> u32 {
        self.with_instance(handle, |instance| instance.storage_attempts)
            .unwrap_or_default()
    }

    /// Storage policy applied to `handle`, if any change succeeded.
    #[must_use]
    pub fn storage_policy(&self, handle: &InstanceHandle) -> Option<StoragePolicy> {
        self.with_instance(handle, |instance| instance.storage_policy)
            .flatten()
    }

    /// Tags written to `handle`, in write order.
    #[must_use]
    pub fn tags(&self, handle: &InstanceHandle) -> Vec<(String, String)> {
        self.with_instance(handle, |instance| instance.tags.clone())
            .unwrap_or_default()
    }

    /// Registers a security group that already exists.
    pub fn add_security_group(&self, name: &str) {
        self.state().security_groups.insert(name.to_owned());
    }

    /// Makes every attempt to ensure `name` fail.
    pub fn fail_security_group(&self, name: &str) {
        self.state().failing_groups.insert(name.to_owned());
    }

    /// Security groups known to the provider, sorted by name.
    #[must_use]
    pub fn security_groups(&self) -> Vec<String> {
        self.state().security_groups.iter().cloned().collect()
    }

    /// Calls made to [`CloudProvider::create_security_group`].
    #[must_use]
    pub fn security_group_calls(&self) -> usize {
        self.state().security_group_calls
    }

    /// Registers an image as visible.
    pub fn add_image(&self, image_id: &str) {
        self.state().images.insert(image_id.to_owned());
    }

    /// Makes every image lookup fail.
    pub fn fail_image_lookups(&self) {
        self.state().fail_image_lookups = true;
    }
}

impl CloudProvider for ScriptedProvider {
    type Error = ScriptedProviderError;

    fn launch_batch<'a>(
        &'a self,
        spec: &'a LaunchSpec,
    ) -> ProviderFuture<'a, Vec<InstanceHandle>, Self::Error> {
        Box::pin(ready(self.state().launch(spec)))
    }

    fn get_status<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ProviderFuture<'a, InstanceState, Self::Error> {
        Box::pin(ready(self.state().status(handle)))
    }

    fn get_addresses<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> ProviderFuture<'a, InstanceAddresses, Self::Error> {
        Box::pin(ready(self.state().addresses(handle)))
    }

    fn modify_storage_attribute<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        policy: StoragePolicy,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(ready(self.state().storage(handle, policy)))
    }

    fn tag<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(ready(self.state().tag(handle, key, value)))
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> ProviderFuture<'a, SecurityGroupOutcome, Self::Error> {
        Box::pin(ready(self.state().security_group(name)))
    }

    fn image_exists<'a>(&'a self, image_id: &'a str) -> ProviderFuture<'a, bool, Self::Error> {
        Box::pin(ready(self.state().image(image_id)))
    }
}

#[derive(Debug, Default)]
struct HookState {
    targets: Vec<BootstrapTarget>,
    failing_hosts: BTreeSet<String>,
}

/// Bootstrap hook that records every target it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingHook {
    state: Arc<Mutex<HookState>>,
}

impl RecordingHook {
    /// Creates a hook that accepts every target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StdMutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the hook fail for `hostname`.
    pub fn fail_for(&self, hostname: &str) {
        self.state().failing_hosts.insert(hostname.to_owned());
    }

    /// Targets received so far, in call order.
    #[must_use]
    pub fn targets(&self) -> Vec<BootstrapTarget> {
        self.state().targets.clone()
    }

    /// Hostnames received so far, in call order.
    #[must_use]
    pub fn hostnames(&self) -> Vec<String> {
        self.state()
            .targets
            .iter()
            .map(|target| target.hostname.clone())
            .collect()
    }

    fn record(&self, target: &BootstrapTarget) -> Result<(), BootstrapError> {
        let mut state = self.state();
        state.targets.push(target.clone());
        if state.failing_hosts.contains(&target.hostname) {
            return Err(BootstrapError::Other(format!(
                "scripted failure for {}",
                target.hostname
            )));
        }
        Ok(())
    }
}

impl BootstrapHook for RecordingHook {
    fn bootstrap<'a>(&'a self, target: &'a BootstrapTarget) -> BootstrapFuture<'a> {
        Box::pin(ready(self.record(target)))
    }
}

#[derive(Debug, Default)]
struct RunnerState {
    responses: VecDeque<CommandOutput>,
    invocations: Vec<CommandInvocation>,
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<RunnerState>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StdMutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.state().invocations.clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.state().responses.push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        let mut state = self.state();
        state.invocations.push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        state.responses.pop_front().ok_or_else(|| SpawnError {
            program: program.to_owned(),
            message: String::from("no scripted response available"),
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
