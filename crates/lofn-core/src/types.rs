//! Domain types for managed processes and function descriptors

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What kind of process a managed subprocess is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessRole {
    /// The Pub/Sub emulator backing service
    Emulator,
    /// A local functions-framework runtime serving one function
    Function,
}

/// Lifecycle state of a managed process.
///
/// The valid transition graph:
///
/// ```text
/// Stopped ──▶ Starting ──▶ Running ──▶ Stopping ──▶ Stopped
///                │            │            ▲
///                │            ▼            │
///                ├──────▶ Errored ─────────┘ (settles directly to Stopped)
///                └──────▶ Stopping
/// ```
///
/// `Running` is reachable only from `Starting`, after a readiness signal.
/// `Errored` is reachable from `Starting` (exit before ready) and from
/// `Running` (unsolicited crash). Recovery from `Errored` requires a full
/// `Stopped -> Starting` cycle; the only transition out of `Errored` is the
/// settling `Errored -> Stopped` a halt performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Errored,
}

impl ProcessState {
    /// Whether moving from `self` to `next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Errored)
                | (Starting, Stopping)
                | (Running, Errored)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Errored, Stopped)
        )
    }

    /// Lowercase label for display in the process table.
    pub fn label(self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How a function is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Plain HTTP function, invoked directly
    Http,
    /// Event function fed by a push subscription on `topic`
    PubSub { topic: String },
}

impl TriggerKind {
    /// Whether the functions-framework invocation needs the event signature.
    ///
    /// The rule is explicit: only a Pub/Sub topic trigger gets the event
    /// signature, never "anything that is not http".
    pub fn is_event(&self) -> bool {
        matches!(self, TriggerKind::PubSub { .. })
    }

    /// The topic name, for Pub/Sub triggers.
    pub fn topic(&self) -> Option<&str> {
        match self {
            TriggerKind::PubSub { topic } => Some(topic),
            TriggerKind::Http => None,
        }
    }
}

/// A configured function to serve locally. Read-only input to the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Function name; also the default entry point and the process row label
    pub name: String,

    /// Exported symbol to invoke; defaults to `name` when absent
    pub entry_point: Option<String>,

    /// Source directory passed to the runtime; omitted when absent
    pub source: Option<PathBuf>,

    /// How the function is triggered
    pub trigger: TriggerKind,

    /// Extra environment variables for the runtime process.
    ///
    /// BTreeMap so invocation env ordering is deterministic.
    pub env: BTreeMap<String, String>,
}

impl FunctionDescriptor {
    /// The entry point to pass to the runtime (`entry_point` or `name`).
    pub fn target(&self) -> &str {
        self.entry_point.as_deref().unwrap_or(&self.name)
    }
}
