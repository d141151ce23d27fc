//! Readiness detection over raw subprocess output
//!
//! Readiness is inferred from unstructured output, which is inherently
//! fragile; everything here hides behind [`ReadinessProbe`] so an alternate
//! strategy (health-check polling, a sentinel file) can replace text matching
//! without touching the managed-process contract.

use regex::Regex;

use lofn_core::Error;

/// Retain at most this much output while waiting for a marker.
const PROBE_BUFFER_MAX: usize = 64 * 1024;

/// Metadata captured as a side effect of a readiness match.
#[derive(Debug, Clone, Default)]
pub struct ReadyInfo {
    /// Port extracted from the readiness line, when the marker carries one
    pub port: Option<u16>,
}

/// Terminal failure reported by a probe before readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessFailure {
    /// The process could not bind its port
    PortInUse,
    /// Any other fatal startup condition recognized in the output
    Other(String),
}

impl ReadinessFailure {
    pub(crate) fn into_error(self, name: &str) -> Error {
        match self {
            ReadinessFailure::PortInUse => Error::PortAlreadyInUse,
            ReadinessFailure::Other(message) => Error::process(format!("{name}: {message}")),
        }
    }
}

/// Verdict after observing one more chunk of output.
#[derive(Debug, Clone)]
pub enum Readiness {
    /// Keep waiting
    Pending,
    /// The process is usable
    Ready(ReadyInfo),
    /// The process will never become usable
    Failed(ReadinessFailure),
}

/// Decides when a process has become usable by inspecting streamed output.
///
/// `observe` is called with arbitrary chunks: a marker may arrive split
/// across calls, so implementations buffer until a match is unambiguous.
pub trait ReadinessProbe: Send + 'static {
    fn observe(&mut self, chunk: &str) -> Readiness;
}

/// Append `chunk`, discarding the oldest half of the buffer once it exceeds
/// the cap. The retained tail always exceeds any marker length, so a marker
/// spanning the trim point cannot be lost.
fn push_bounded(buffer: &mut String, chunk: &str) {
    buffer.push_str(chunk);
    if buffer.len() > PROBE_BUFFER_MAX {
        let mut cut = buffer.len() - PROBE_BUFFER_MAX / 2;
        while !buffer.is_char_boundary(cut) {
            cut += 1;
        }
        buffer.drain(..cut);
    }
}

/// Probe for the Pub/Sub emulator.
///
/// Recognizes the "Server started, listening on <port>" line, extracting the
/// port, and the bind failure the emulator prints when its port is taken.
pub struct EmulatorReadyProbe {
    buffer: String,
    listen_re: Regex,
}

const EMULATOR_BIND_FAILURE: &str = "Failed to bind";

impl EmulatorReadyProbe {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            // Trailing non-digit so a port split across chunks is never
            // matched before its last digit has arrived.
            listen_re: Regex::new(r"Server started, listening on (\d+)[^\d]")
                .expect("valid readiness regex"),
        }
    }
}

impl Default for EmulatorReadyProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessProbe for EmulatorReadyProbe {
    fn observe(&mut self, chunk: &str) -> Readiness {
        push_bounded(&mut self.buffer, chunk);

        if self.buffer.contains(EMULATOR_BIND_FAILURE) {
            return Readiness::Failed(ReadinessFailure::PortInUse);
        }

        if let Some(captures) = self.listen_re.captures(&self.buffer) {
            let port = captures.get(1).and_then(|m| m.as_str().parse().ok());
            return Readiness::Ready(ReadyInfo { port });
        }

        Readiness::Pending
    }
}

/// Probe for a functions-framework runtime: ready once it reports
/// "Serving function...".
pub struct FunctionReadyProbe {
    buffer: String,
}

const FUNCTION_SERVING_MARKER: &str = "Serving function...";

impl FunctionReadyProbe {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }
}

impl Default for FunctionReadyProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessProbe for FunctionReadyProbe {
    fn observe(&mut self, chunk: &str) -> Readiness {
        push_bounded(&mut self.buffer, chunk);
        if self.buffer.contains(FUNCTION_SERVING_MARKER) {
            Readiness::Ready(ReadyInfo::default())
        } else {
            Readiness::Pending
        }
    }
}
