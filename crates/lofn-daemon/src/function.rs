//! Local function runtime supervision
//!
//! Runs one user function under `npx functions-framework` as a managed
//! process, with its invocation built from the function descriptor and the
//! port assigned by the session orchestrator.

use tokio::sync::broadcast;

use lofn_core::prelude::*;
use lofn_core::{FunctionDescriptor, ProcessRole, ProcessState};

use crate::process::{CommandSpec, ManagedProcess};
use crate::readiness::FunctionReadyProbe;

#[derive(Debug, Clone, Default)]
pub struct FunctionRunnerOptions {
    /// Local port assigned by the orchestrator before start
    pub port: u16,

    /// Mirror raw runtime output to the host's stderr
    pub debug: bool,

    /// Session-wide environment overlay (env-file contents); descriptor env
    /// takes precedence over it
    pub extra_env: Vec<(String, String)>,
}

/// One user function served by a local functions-framework runtime.
pub struct FunctionRunner {
    descriptor: FunctionDescriptor,
    options: FunctionRunnerOptions,
    process: ManagedProcess,
}

impl FunctionRunner {
    pub fn new(descriptor: FunctionDescriptor, options: FunctionRunnerOptions) -> Self {
        let process = ManagedProcess::new(descriptor.name.clone(), ProcessRole::Function);
        Self {
            descriptor,
            options,
            process,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    /// The assigned local port; also the runner's resolved address.
    pub fn port(&self) -> u16 {
        self.options.port
    }

    /// Where a push subscription should deliver messages for this runner.
    pub fn push_endpoint(&self) -> String {
        format!("http://localhost:{}", self.options.port)
    }

    /// Start the runtime and wait for its "Serving function..." marker.
    pub async fn start(&mut self) -> Result<()> {
        let args = build_args(&self.descriptor, self.options.port);
        let spec = CommandSpec::new("npx", args)
            .with_envs(self.invocation_env())
            .with_mirror_output(self.options.debug);

        self.process
            .start(spec, Box::new(FunctionReadyProbe::new()))
            .await
            .map(|_| ())
    }

    /// Halt the runtime. Idempotent; never fails.
    pub async fn stop(&mut self) {
        self.process.stop().await;
    }

    fn invocation_env(&self) -> Vec<(String, String)> {
        let mut env = self.options.extra_env.clone();
        env.extend(
            self.descriptor
                .env
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        env
    }

    pub fn current_state(&self) -> ProcessState {
        self.process.current_state()
    }

    pub fn subscribe_state(&self) -> (ProcessState, broadcast::Receiver<ProcessState>) {
        self.process.subscribe_state()
    }

    pub fn subscribe_logs(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        self.process.subscribe_logs()
    }

    pub fn log_snapshot(&self) -> Vec<String> {
        self.process.log_snapshot()
    }
}

/// Arguments for `npx functions-framework`.
///
/// The event signature flag is added iff the trigger kind is Pub/Sub; an
/// HTTP function never gets it.
fn build_args(descriptor: &FunctionDescriptor, port: u16) -> Vec<String> {
    let mut args = vec![
        "functions-framework".to_string(),
        format!("--target={}", descriptor.target()),
        format!("--port={port}"),
    ];

    if let Some(source) = &descriptor.source {
        args.push(format!("--source={}", source.display()));
    }

    if descriptor.trigger.is_event() {
        args.push("--signature-type=event".to_string());
    }

    args
}
