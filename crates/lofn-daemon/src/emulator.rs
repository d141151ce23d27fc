//! Pub/Sub emulator lifecycle
//!
//! Runs `gcloud beta emulators pubsub start` as a managed process, extracts
//! the bound port from its output, and installs the `env-init` environment
//! variables that point client libraries at the emulator for the duration of
//! the session.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::broadcast;

use lofn_core::prelude::*;
use lofn_core::{ProcessRole, ProcessState};

use crate::process::{CommandSpec, ManagedProcess};
use crate::readiness::EmulatorReadyProbe;

/// Row label for the emulator in the process table.
pub const EMULATOR_PROCESS_NAME: &str = "PubSub Emulator";

/// The discovery variable `env-init` exports. Installed while the emulator
/// runs; removed on every stop path so a later operation cannot silently
/// target a dead emulator.
pub const PUBSUB_EMULATOR_HOST: &str = "PUBSUB_EMULATOR_HOST";

#[derive(Debug, Clone, Default)]
pub struct EmulatorOptions {
    /// GCP project id scoping all emulator resources
    pub project: String,

    /// Explicit data directory. Must exist. When absent the emulator owns a
    /// temporary directory removed on teardown.
    pub data_dir: Option<PathBuf>,

    /// host:port to bind, e.g. `localhost:8085`. Emulator default when absent.
    pub host_port: Option<String>,

    /// Verbose emulator output plus passthrough to the host's stderr
    pub debug: bool,
}

enum DataDir {
    Explicit(PathBuf),
    Owned(Option<TempDir>),
}

/// The Pub/Sub emulator as a managed process role.
pub struct PubSubEmulator {
    options: EmulatorOptions,
    process: ManagedProcess,
    data_dir: DataDir,
    port: Option<u16>,
    env_keys: Vec<String>,
}

impl PubSubEmulator {
    /// Validates the configured data directory (or creates an owned temp
    /// one). Fails with [`Error::InvalidDataDirectory`] before any process
    /// is spawned.
    pub fn new(options: EmulatorOptions) -> Result<Self> {
        let data_dir = match &options.data_dir {
            Some(path) => {
                if !path.is_dir() {
                    return Err(Error::invalid_data_dir(path));
                }
                DataDir::Explicit(path.clone())
            }
            None => DataDir::Owned(Some(TempDir::with_prefix("lofn-pubsub-")?)),
        };

        Ok(Self {
            options,
            process: ManagedProcess::new(EMULATOR_PROCESS_NAME, ProcessRole::Emulator),
            data_dir,
            port: None,
            env_keys: Vec::new(),
        })
    }

    /// Start the emulator and wait until it is reachable.
    ///
    /// Resolves after the readiness line has been observed (capturing the
    /// bound port) and `env-init` has been queried and installed. A busy
    /// bind port surfaces as [`Error::PortAlreadyInUse`].
    pub async fn start(&mut self) -> Result<()> {
        let data_path = self.ensure_data_dir()?;
        let args = build_start_args(&self.options, &data_path);
        let spec = CommandSpec::new("gcloud", args).with_mirror_output(self.options.debug);

        let ready = self
            .process
            .start(spec, Box::new(EmulatorReadyProbe::new()))
            .await?;

        // The bind port is set once, from the readiness match.
        if self.port.is_none() {
            self.port = ready.port;
        }
        info!("Emulator listening on port {:?}", self.port);

        match init_environment().await {
            Ok(vars) => {
                for (key, value) in &vars {
                    std::env::set_var(key, value);
                }
                self.env_keys = vars.into_iter().map(|(key, _)| key).collect();
                Ok(())
            }
            Err(e) => {
                self.process.fail("env-init failed").await;
                self.teardown_environment();
                Err(e)
            }
        }
    }

    /// Halt the emulator, remove its environment variables, and delete an
    /// owned temporary data directory. Idempotent; never fails.
    pub async fn stop(&mut self) {
        self.process.stop().await;
        self.teardown_environment();

        if let DataDir::Owned(owned) = &mut self.data_dir {
            if let Some(dir) = owned.take() {
                if let Err(e) = dir.close() {
                    warn!("Failed to remove emulator data dir: {}", e);
                }
            }
        }
    }

    /// Remove every variable this controller installed. Runs on every stop
    /// path, including stops after an unexpected exit.
    fn teardown_environment(&mut self) {
        for key in self.env_keys.drain(..) {
            std::env::remove_var(key);
        }
        std::env::remove_var(PUBSUB_EMULATOR_HOST);
    }

    fn ensure_data_dir(&mut self) -> Result<PathBuf> {
        match &mut self.data_dir {
            DataDir::Explicit(path) => Ok(path.clone()),
            DataDir::Owned(owned) => {
                if owned.is_none() {
                    // A previous stop removed the directory; own a fresh one.
                    *owned = Some(TempDir::with_prefix("lofn-pubsub-")?);
                }
                Ok(owned.as_ref().expect("owned data dir").path().to_path_buf())
            }
        }
    }

    pub fn name(&self) -> &str {
        self.process.name()
    }

    pub fn project_id(&self) -> &str {
        &self.options.project
    }

    /// The resolved bind port, once the readiness line has been seen.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Base URL of the emulator's REST surface, once the port is known.
    pub fn endpoint(&self) -> Option<String> {
        self.port.map(|port| format!("http://localhost:{port}"))
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

/// Arguments for `gcloud beta emulators pubsub start`.
fn build_start_args(options: &EmulatorOptions, data_dir: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["beta", "emulators", "pubsub", "start"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    args.push(format!("--data-dir={}", data_dir.display()));

    if options.debug {
        args.push("--log-http".to_string());
        args.push("--user-output-enabled".to_string());
        args.push("--verbosity=debug".to_string());
    }

    if let Some(host_port) = &options.host_port {
        args.push(format!("--host-port={host_port}"));
    }

    args.push(format!("--project={}", options.project));

    args
}

/// Query `gcloud beta emulators pubsub env-init` for the variables a client
/// must set to reach the running emulator.
async fn init_environment() -> Result<Vec<(String, String)>> {
    let output = Command::new("gcloud")
        .args(["beta", "emulators", "pubsub", "env-init"])
        .output()
        .await
        .map_err(|e| Error::process(format!("env-init failed to run: {e}")))?;

    if !output.status.success() {
        return Err(Error::process(format!(
            "env-init exited with {:?}",
            output.status.code()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_env_init(&stdout))
}

/// Parse `env-init` output: one `export KEY=VALUE` per line.
fn parse_env_init(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .filter_map(|line| {
            let assignment = line.trim().strip_prefix("export ")?;
            let (key, value) = assignment.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
