//! Message types for the application (TEA pattern)

use crate::input_key::InputKey;
use lofn_core::ProcessState;

/// All possible messages/actions in the application
#[derive(Debug, Clone)]
pub enum Message {
    /// Keyboard event from terminal
    Key(InputKey),

    /// A managed process changed lifecycle state
    ProcessState { name: String, state: ProcessState },

    /// A managed process emitted a log line
    ProcessLog { name: String, line: String },

    /// A managed process resolved its port (the emulator, once its
    /// readiness line has been seen)
    ProcessPort { name: String, port: u16 },

    /// Push subscriptions were provisioned
    SubscriptionsReconciled { count: usize },

    /// Something in the session went wrong. Fatal errors quit the
    /// application; non-fatal ones only surface in the status bar.
    SessionError { message: String, fatal: bool },

    /// Tick event for periodic redraws
    Tick,

    /// Quit the application
    Quit,
}
