//! # lofn-daemon - Subprocess Supervision
//!
//! Manages the Pub/Sub emulator and function runtime child processes, infers
//! lifecycle state from their output streams, and reconciles push
//! subscriptions against the running emulator.
//!
//! Depends on [`lofn_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Supervision
//! - [`ManagedProcess`] - Spawn and supervise one external executable
//! - [`CommandSpec`] - What to run and with which environment overlay
//! - [`LogFeed`], [`StateCell`] - Broadcast feeds with replay
//!
//! ### Readiness Detection
//! - [`ReadinessProbe`] - Chunk-buffering predicate over streamed output
//! - [`EmulatorReadyProbe`], [`FunctionReadyProbe`] - The two built-in probes
//!
//! ### Process Roles
//! - [`PubSubEmulator`] - The emulator controller (port capture, env-init)
//! - [`FunctionRunner`] - One function under a local runtime
//!
//! ### Subscription Reconciliation
//! - [`PubSubApi`] - Minimal admin surface (check-then-create semantics)
//! - [`EmulatorPubSubClient`] - REST client against the emulator
//! - [`reconcile_push_subscription()`] - Create-or-update one subscription
//!
//! ### Host Tools
//! - [`ToolAvailability`] - gcloud / npx presence checks

pub mod emulator;
pub mod feed;
pub mod function;
pub mod process;
pub mod pubsub;
pub mod readiness;
pub mod tool_availability;

// Public API re-exports
pub use emulator::{
    EmulatorOptions, PubSubEmulator, EMULATOR_PROCESS_NAME, PUBSUB_EMULATOR_HOST,
};
pub use feed::{LogFeed, StateCell};
pub use function::{FunctionRunner, FunctionRunnerOptions};
pub use process::{CommandSpec, ManagedProcess};
pub use pubsub::{
    reconcile_push_subscription, subscription_name, EmulatorPubSubClient, PubSubApi,
    SubscriptionSpec,
};
pub use readiness::{
    EmulatorReadyProbe, FunctionReadyProbe, Readiness, ReadinessFailure, ReadinessProbe, ReadyInfo,
};
pub use tool_availability::ToolAvailability;
