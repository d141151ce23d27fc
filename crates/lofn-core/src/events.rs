//! Subprocess event definitions

/// Which pipe an output chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Events from a managed subprocess.
///
/// Output is delivered as raw chunks, not lines: readiness markers can be
/// split across arbitrary read boundaries, so anything that cares about
/// message framing buffers on its own.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A raw chunk of output from stdout or stderr
    Output {
        stream: OutputStream,
        chunk: String,
    },

    /// The process has exited
    Exited { code: Option<i32> },
}
