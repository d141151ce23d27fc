//! lofn-tui - Terminal UI for lofn
//!
//! This crate provides the ratatui-based terminal interface: terminal setup,
//! event polling, the process table and log view widgets, and the main loop
//! that drains messages, updates state, and redraws.

pub mod event;
pub mod layout;
pub mod render;
pub mod runner;
pub mod terminal;
pub mod widgets;

// Re-export main entry point
pub use runner::run;
