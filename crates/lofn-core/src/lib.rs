//! # lofn-core - Core Domain Types
//!
//! Foundation crate for lofn. Provides domain types, error handling, process
//! event definitions, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`ProcessState`] - Managed process lifecycle state (Stopped, Starting, ...)
//! - [`ProcessRole`] - What a managed process is (the emulator or a function)
//! - [`FunctionDescriptor`] - A configured function to serve locally
//! - [`TriggerKind`] - How a function is invoked (HTTP or a Pub/Sub topic)
//!
//! ### Events (`events`)
//! - [`ProcessEvent`] - Output chunks and exit notifications from a subprocess
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use lofn_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all lofn crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{OutputStream, ProcessEvent};
pub use types::{FunctionDescriptor, ProcessRole, ProcessState, TriggerKind};
