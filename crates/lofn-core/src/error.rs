//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Terminal/TUI Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Terminal error: {message}")]
    Terminal { message: String },

    // ─────────────────────────────────────────────────────────────
    // Process Supervision Errors
    // ─────────────────────────────────────────────────────────────
    #[error("gcloud CLI not found. Install the Google Cloud SDK and ensure 'gcloud' is in your PATH.")]
    GcloudNotFound,

    #[error("npx not found. Install Node.js and ensure 'npx' is in your PATH.")]
    NpxNotFound,

    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Process '{name}' exited before becoming ready (code: {code:?})")]
    ProcessExitedBeforeReady { name: String, code: Option<i32> },

    // ─────────────────────────────────────────────────────────────
    // Emulator Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Emulator data directory does not exist: {path}")]
    InvalidDataDirectory { path: PathBuf },

    #[error("Emulator port already in use")]
    PortAlreadyInUse,

    // ─────────────────────────────────────────────────────────────
    // Messaging Backend Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Cannot reach the Pub/Sub emulator: {message}")]
    MessagingBackendUnreachable { message: String },

    #[error("Pub/Sub backend error: {message}")]
    Backend { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn exited_before_ready(name: impl Into<String>, code: Option<i32>) -> Self {
        Self::ProcessExitedBeforeReady {
            name: name.into(),
            code,
        }
    }

    pub fn invalid_data_dir(path: impl Into<PathBuf>) -> Self {
        Self::InvalidDataDirectory { path: path.into() }
    }

    pub fn unreachable_backend(message: impl Into<String>) -> Self {
        Self::MessagingBackendUnreachable {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Check if this error should abort the whole session.
    ///
    /// A non-fatal error degrades a single process; a fatal one means nothing
    /// useful can run (no emulator, no backend, bad configuration).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::GcloudNotFound
                | Error::NpxNotFound
                | Error::InvalidDataDirectory { .. }
                | Error::PortAlreadyInUse
                | Error::MessagingBackendUnreachable { .. }
                | Error::Config { .. }
                | Error::ConfigNotFound { .. }
                | Error::Terminal { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
