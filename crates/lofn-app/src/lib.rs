//! lofn-app - Application state and orchestration for lofn
//!
//! This crate implements the TEA (The Elm Architecture) pattern for state
//! management: messages in, state mutations out, no rendering. It also owns
//! configuration loading and the session orchestrator that drives the
//! emulator and function runner lifecycles.

pub mod config;
pub mod handler;
pub mod input_key;
pub mod message;
pub mod session;
pub mod signals;
pub mod state;

// Re-export primary types
pub use config::HarnessConfig;
pub use handler::{update, UpdateResult};
pub use input_key::InputKey;
pub use message::Message;
pub use session::SessionProcesses;
pub use state::{AppState, ProcessEntry};
